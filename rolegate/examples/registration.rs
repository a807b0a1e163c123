//! Prints the webhook configuration for a CA bundle read from stdin
//!
//! ```sh
//! cargo run --example registration < ca.crt | kubectl apply -f -
//! ```

use std::io::Read;

use rolegate::Config;
use rolegate::registration::validating_webhook_configuration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let mut ca_bundle = Vec::new();
    std::io::stdin().read_to_end(&mut ca_bundle)?;

    let configuration = validating_webhook_configuration(&config, ca_bundle);
    println!("{}", serde_json::to_string_pretty(&configuration)?);

    Ok(())
}
