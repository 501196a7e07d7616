//! VKVM service entry point.
//!
//! One binary, role selected by config. Besides the default service
//! mode, a few one-shot flags exist for scripting and diagnostics:
//! `--list`, `--switch NAME`, `--test-input`, `--ui`.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vkvm::session::switcher::{NoBroadcast, Switcher};
use vkvm::session::Session;
use vkvm_core::config::Role;
use vkvm_core::ConfigManager;
use vkvm_platform::ddc::{self, DdcController, InputSource};

#[derive(Debug, Parser)]
#[command(name = "vkvm", version, about = "Software KVM: DDC/CI monitor switching with input forwarding")]
struct Cli {
    /// Open the configuration UI
    #[arg(long)]
    ui: bool,

    /// List connected monitors and exit
    #[arg(long)]
    list: bool,

    /// Switch to the named profile and exit
    #[arg(long, value_name = "NAME")]
    switch: Option<String>,

    /// Run the input capture/injection smoke test
    #[arg(long)]
    test_input: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigManager::new() {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            eprintln!("failed to locate configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.load() {
        // Keep running on defaults; the UI surfaces the problem on the
        // next change.
        eprintln!("warning: failed to load config: {e}");
    }

    let log_level = config.get().general.log_level;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let result = if cli.list {
        list_monitors(&config).await
    } else if let Some(profile) = cli.switch {
        switch_once(&config, &profile).await
    } else if cli.test_input {
        input_test().await
    } else {
        run_service(config, cli.ui).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_service(config: Arc<ConfigManager>, show_ui: bool) -> anyhow::Result<()> {
    info!("VKVM service starting");
    if show_ui {
        let port = config.get().general.api_port;
        info!("settings UI: http://127.0.0.1:{port}/");
    }
    Session::new(config).run().await
}

async fn list_monitors(config: &Arc<ConfigManager>) -> anyhow::Result<()> {
    let heuristic = config.get().general.hdmi_dp_heuristic;
    let controller = ddc::platform_controller(heuristic)?;
    let monitors = tokio::task::spawn_blocking(move || controller.list_monitors()).await??;

    println!("Connected Monitors:");
    println!("-------------------");
    for monitor in monitors {
        println!("ID: {}", monitor.id);
        if !monitor.name.is_empty() {
            println!("  Name: {}", monitor.name);
        }
        if !monitor.serial.is_empty() {
            println!("  Serial: {}", monitor.serial);
        }
        if let Some(code) = monitor.input_source {
            println!("  Input: {} (0x{code:02X})", InputSource(code).label());
        }
        println!(
            "  DDC/CI: {}",
            if monitor.ddc_supported {
                "supported"
            } else {
                "not supported"
            }
        );
        println!();
    }
    Ok(())
}

async fn switch_once(config: &Arc<ConfigManager>, profile: &str) -> anyhow::Result<()> {
    let general = config.get().general;

    // On an agent the host is authoritative: hand the request to the
    // coordinator's API instead of acting locally.
    if general.role == Role::Agent && !general.coordinator_addr.is_empty() {
        post_remote_switch(&general.coordinator_addr, profile, &general.api_token).await?;
        println!("forwarded switch to host: {profile}");
        return Ok(());
    }

    let ddc: Option<Arc<dyn DdcController>> = match ddc::platform_controller(general.hdmi_dp_heuristic)
    {
        Ok(controller) => Some(Arc::from(controller)),
        Err(e) => {
            warn!(error = %e, "DDC unavailable");
            None
        }
    };

    let switcher = Switcher::new(Arc::clone(config), ddc, Arc::new(NoBroadcast));
    switcher.switch_to(profile, true).await?;
    println!("switched to profile: {profile}");
    Ok(())
}

/// Minimal HTTP POST to the coordinator's switch endpoint.
async fn post_remote_switch(addr: &str, profile: &str, token: &str) -> anyhow::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    let auth_header = if token.is_empty() {
        String::new()
    } else {
        format!("Authorization: Bearer {token}\r\n")
    };
    let profile = profile.replace(' ', "%20");
    let request = format!(
        "POST /api/switch?profile={profile}&propagate=true HTTP/1.1\r\nHost: {addr}\r\n{auth_header}Content-Length: 0\r\nConnection: close\r\n\r\n",
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains(" 200 ") {
        anyhow::bail!("host rejected switch: {status_line}");
    }
    Ok(())
}

async fn input_test() -> anyhow::Result<()> {
    use vkvm_platform::capture;

    println!("input test: capturing for 30 seconds (kill switch: Ctrl+Alt+Esc)");
    let capture = capture::platform_capture()?;
    capture.start()?;
    capture.set_kill_switch(Box::new(|| {
        println!("kill switch fired");
    }));

    let queue = capture.events();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(30);
    let mut count = 0u64;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
            event = queue.recv() => {
                count += 1;
                println!("event #{count}: {:?}", event.event);
            }
        }
    }
    capture.stop();
    println!("input test captured {count} events");
    Ok(())
}
