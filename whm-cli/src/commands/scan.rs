use clap::Args;
use std::io::{self, BufRead, Write};
use whm_core::scan_or_enter_code;

use super::product::print_lookup;
use super::OutputFormat;
use crate::config::Config;
use crate::sync::open_coordinator;

/// Scan or type a barcode and look up the product
#[derive(Args)]
pub struct ScanCommand {
    /// Barcode; read from stdin when omitted (scanner wedge or keyboard)
    code: Option<String>,

    /// Only print the normalized code, skip the product lookup
    #[arg(long)]
    no_lookup: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ScanCommand {
    /// Returns true if the command will look the code up.
    pub fn looks_up(&self) -> bool {
        !self.no_lookup
    }

    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let input = match &self.code {
            Some(code) => code.clone(),
            None => read_code()?,
        };

        let code = scan_or_enter_code(&input).ok_or("Please enter a barcode")?;

        if self.no_lookup {
            println!("{}", code);
            return Ok(());
        }

        let coordinator = open_coordinator(config).await?;
        let lookup = coordinator.fetch_product(&code).await?;
        print_lookup(&code, &lookup, &self.format)?;
        Ok(())
    }
}

fn read_code() -> Result<String, io::Error> {
    eprint!("Scan or enter barcode: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
