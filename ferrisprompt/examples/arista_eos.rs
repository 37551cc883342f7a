//! Arista EOS example
//!
//! Runs operational commands through the async driver, then (optionally)
//! opens a blocking session for a named config session with diff and abort.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example arista_eos -- --host switch1 --user admin --password secret
//! cargo run --example arista_eos -- --host switch1 --user admin --password secret --show-config
//! ```

use std::env;
use std::time::Duration;

use ferrisprompt::platform::vendors::arista::AristaConfigSession;
use ferrisprompt::{DriverBuilder, HostKeyVerification, SendOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    println!("Connecting to {}:{}...", args.host, args.port);

    let builder = || {
        DriverBuilder::new(&args.host)
            .port(args.port)
            .username(&args.user)
            .password(&args.password)
            .secondary_secret(&args.password)
            .platform("arista_eos")
            .timeout(Duration::from_secs(args.timeout))
            .host_key_verification(HostKeyVerification::Disabled)
    };

    let driver = builder().build_async()?;
    driver.open().await?;
    println!("Connected! Prompt: {}", driver.get_prompt(None).await?);

    let responses = driver
        .send_inputs(
            &["show version", "show interfaces status", "show ip route summary"],
            SendOptions::default(),
        )
        .await?;
    for response in &responses {
        println!("\n> {}", response.input);
        if response.is_success() {
            for line in response.lines().take(20) {
                println!("{}", line);
            }
        } else {
            eprintln!("Failed: {:?}", response.failure_message);
        }
    }
    driver.close().await?;

    if args.show_config {
        // SshTransport blocks on its own runtime; keep it off the async workers
        let builder = builder();
        tokio::task::spawn_blocking(move || config_session_demo(builder)).await??;
    }

    println!("Done!");
    Ok(())
}

fn config_session_demo(builder: DriverBuilder) -> Result<(), ferrisprompt::Error> {
    println!("\n--- Named Config Session Demo ---\n");
    let mut driver = builder.build()?;
    driver.open()?;

    let mut session = AristaConfigSession::new(&mut driver, "ferrisprompt-demo")?;
    let diff = session.diff()?;
    if diff.trim().is_empty() {
        println!("No pending changes in session");
    } else {
        println!("Session diffs:\n{}", diff);
    }
    session.abort()?;
    println!("Config session aborted (demo mode)");
    driver.close()
}

/// Simple argument parser
struct Args {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: u64,
    show_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 22,
            user: env::var("USER").unwrap_or_else(|_| "admin".to_string()),
            password: String::new(),
            timeout: 30,
            show_config: false,
        };

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--show-config" | "-c" => parsed.show_config = true,
                flag => {
                    let value = args.next().unwrap_or_default();
                    match flag {
                        "--host" | "-h" => parsed.host = value,
                        "--port" | "-p" => parsed.port = value.parse().unwrap_or(22),
                        "--user" | "-u" => parsed.user = value,
                        "--password" | "-P" => parsed.password = value,
                        "--timeout" | "-t" => parsed.timeout = value.parse().unwrap_or(30),
                        other => eprintln!("Unknown argument: {}", other),
                    }
                }
            }
        }
        parsed
    }
}
