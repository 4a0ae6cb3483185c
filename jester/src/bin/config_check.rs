use clap::{Arg, Command};
use sha3::{Digest, Sha3_256};

use jester::config::interpolate_secrets;

fn main() {
    let matches = Command::new("Config Check")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Confirm that secrets interpolated config is what you expect it to be")
        .arg(
            Arg::new("config")
                .help("Path to the configuration toml file")
                .long("config")
                .default_value("./jester/resources/jester.toml"),
        )
        .arg(
            Arg::new("secrets")
                .help("Path to the secrets json file")
                .long("secrets")
                .default_value("./jester/private-resources/secrets.json"),
        )
        .get_matches();

    let config = std::fs::read_to_string(matches.get_one::<String>("config").unwrap())
        .expect("Failed to read configuration file");

    let config = interpolate_secrets(config, matches.get_one::<String>("secrets").unwrap())
        .expect("Failed to interpolate secrets into the configuration");

    let mut hasher = Sha3_256::new();
    hasher.update(config.as_bytes());
    let config_hash = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();

    println!("---------- Jester Config ----------\n{config}");
    println!("---------- Configuration Hash ----------\n{config_hash}")
}
