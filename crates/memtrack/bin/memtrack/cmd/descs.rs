use clap::Parser;
use eyre::Result;
use memtrack::{DescriptorTable, MemDesc, RuntimeDescriptors};

#[derive(Debug, Parser)]
pub struct DescsArgs {
    #[arg(long, help = "Print the categories as a JSON array")]
    pub json: bool,
}

impl DescsArgs {
    pub fn run(&self) -> Result<()> {
        let descs = RuntimeDescriptors::new();
        let labels: Vec<(u32, &str)> = (0..descs.len() as u32)
            .map(|tag| (tag, descs.label(MemDesc(tag))))
            .collect();

        if self.json {
            let json: Vec<_> = labels
                .iter()
                .map(|(tag, label)| serde_json::json!({ "desc": tag, "label": label }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            for (tag, label) in labels {
                println!("{:>3}  {}", tag, label);
            }
        }
        Ok(())
    }
}
