//! Basic example: Connect to a Linux host and run a few commands
//!
//! # Prerequisites
//!
//! - SSH server running on localhost (port 22)
//! - Valid credentials (username/password or SSH key)
//!
//! # Usage
//!
//! ```bash
//! cargo run --example basic_ls -- --host localhost --user your_username --password your_password
//! cargo run --example basic_ls -- --host localhost --user your_username --key ~/.ssh/id_rsa
//! ```
//!
//! Add `--record session.log` to capture the raw terminal output.

use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use ferrisprompt::{DriverBuilder, SendOptions, SessionRecorder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = DriverBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .platform("linux")
        .timeout(Duration::from_secs(args.timeout));

    if let Some(password) = &args.password {
        builder = builder.password(password).secondary_secret(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }
    if let Some(path) = &args.record {
        builder = builder.recorder(SessionRecorder::writer(File::create(path)?));
    }

    let mut driver = builder.build()?;
    driver.open()?;
    println!("Connected! Prompt level: {:?}", driver.current_privilege());

    let options = SendOptions::default();
    let response = driver.send_input("ls -la", &options)?;
    if response.failed() {
        eprintln!("Command failed: {:?}", response.failure_message);
    } else {
        println!("{}", response.result);
    }
    println!("Command completed in {:?}", response.elapsed);

    let responses = driver.send_inputs(&["pwd", "whoami", "uname -a"], &options)?;
    for response in &responses {
        println!("> {}\n{}", response.input, response.result.trim());
    }
    println!("Batch took {:?}", responses.elapsed());

    driver.close()?;
    println!("Done!");
    Ok(())
}

/// Simple argument parser
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
    record: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 22,
            user: env::var("USER").unwrap_or_else(|_| "root".to_string()),
            password: None,
            key: None,
            timeout: 30,
            record: None,
        };

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = || args.next().unwrap_or_default();
            match arg.as_str() {
                "--host" | "-h" => parsed.host = value(),
                "--port" | "-p" => parsed.port = value().parse().unwrap_or(22),
                "--user" | "-u" => parsed.user = value(),
                "--password" | "-P" => parsed.password = Some(value()),
                "--key" | "-k" => parsed.key = Some(PathBuf::from(value())),
                "--timeout" | "-t" => parsed.timeout = value().parse().unwrap_or(30),
                "--record" | "-r" => parsed.record = Some(PathBuf::from(value())),
                other => eprintln!("Unknown argument: {}", other),
            }
        }
        parsed
    }
}
