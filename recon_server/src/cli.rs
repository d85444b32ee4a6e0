use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 16] = [
        "RUST_LOG",
        "RECON_HOST",
        "RECON_PORT",
        "RECON_DATABASE_URL",
        "RECON_USE_X_FORWARDED_FOR",
        "RECON_USE_FORWARDED",
        "RECON_PROCESSORS",
        "RECON_REVIEW_THRESHOLD",
        "RECON_REJECT_THRESHOLD",
        "RECON_CAPTURE_FROM_LISTENER",
        "RECON_CAPTURE_JOB_QUEUE_COUNT",
        "RECON_REQUEUE_DELAY_SECS",
        "RECON_REQUEUE_MAX_AGE_SECS",
        "RECON_WORKERS",
        "RECON_WORKER_POLL_MS",
        "RECON_PENDING_MAX_AGE_DAYS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| print_env(name));
    let processors = env::var("RECON_PROCESSORS").unwrap_or_default();
    for processor in processors.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let prefix = format!("RECON_{}", processor.to_uppercase());
        for suffix in ["DECODER", "HMAC_HEADER", "HMAC_CHECKS", "IP_ALLOWLIST", "API_URL", "TIMEOUT_MS"] {
            print_env(&format!("{prefix}_{suffix}"));
        }
    }
}

fn print_env(name: &str) {
    let val = match env::var(name) {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    };
    println!("  {name:<35} {val:<15}");
}
