//! Hash a password for a user record
//!
//! Prints an Argon2id PHC string suitable for the `users[].password_hash`
//! configuration field. The password is read from `--password` or, if that
//! is absent, from the first line of stdin.

use std::io::{self, BufRead};

use clap::Parser;

use gatekeeper::auth::{CredentialHasher, HashingConfig};

/// Hash a password with Argon2id
#[derive(Parser, Debug)]
#[command(name = "hash_password")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Password to hash; read from stdin when omitted
    #[arg(short, long, env = "GATEKEEPER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Memory cost in KiB
    #[arg(long, default_value_t = HashingConfig::default().memory_kib)]
    memory_kib: u32,

    /// Number of passes
    #[arg(long, default_value_t = HashingConfig::default().iterations)]
    iterations: u32,

    /// Degree of parallelism
    #[arg(long, default_value_t = HashingConfig::default().parallelism)]
    parallelism: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let password = match args.password {
        Some(password) => password,
        None => read_password_from_stdin()?,
    };
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    let hasher = CredentialHasher::new(HashingConfig {
        memory_kib: args.memory_kib,
        iterations: args.iterations,
        parallelism: args.parallelism,
    })?;

    println!("{}", hasher.hash(&password)?);
    Ok(())
}

fn read_password_from_stdin() -> anyhow::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
