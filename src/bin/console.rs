use anyhow::{Context, Result};
use bwconsole::console::{
    init_logging, now_ms, App, Backend, Config, Controller, HttpBackend, NodeRole, Outcome,
    Reporter, UiState,
};
use bwconsole::dial::{DialField, DialSet, Direction, LockableField, TestParameters};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::io::IsTerminal;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "bwconsole")]
#[command(about = "Console for bandwidth, camera and sensor tests", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bandwidth test once or continuously
    Bwtest(BwtestArgs),
    /// Retrieve an image with the camera app
    Camera,
    /// Retrieve sensor readings
    Sensor,
    /// List the client and server nodes
    Nodes,
}

#[derive(Args, Debug)]
struct BwtestArgs {
    /// Client to server test as seconds,size,packets
    #[arg(long, default_value = "3,1000,30")]
    cs: TestParameters,

    /// Server to client test as seconds,size,packets
    #[arg(long, default_value = "3,1000,30")]
    sc: TestParameters,

    /// Dial kept fixed when client to server dials change (size, pkt, bw)
    #[arg(long, default_value = "size")]
    lock_cs: LockableField,

    /// Dial kept fixed when server to client dials change (size, pkt, bw)
    #[arg(long, default_value = "size")]
    lock_sc: LockableField,

    /// Set the client to server bandwidth in Mbps; the unlocked dials follow
    #[arg(long)]
    bw_cs: Option<f64>,

    /// Set the server to client bandwidth in Mbps; the unlocked dials follow
    #[arg(long)]
    bw_sc: Option<f64>,

    /// Repeat the test until interrupted or --runs is reached
    #[arg(long)]
    continuous: bool,

    /// Stop continuous testing after this many runs
    #[arg(long)]
    runs: Option<usize>,

    /// Seconds between continuous runs (defaults to the longest test plus one second)
    #[arg(long)]
    interval: Option<f64>,
}

fn main() {
    let cli = Cli::parse();

    init_logging(&cli.config.log_level, cli.config.is_json_format());

    if let Err(e) = cli.config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!(error = %e, "Console failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Cli { config, command } = cli;
    let backend = HttpBackend::new(&config).context("Failed to create backend client")?;
    let state = UiState::new(config.addl_opt.clone(), now_ms())?;
    let mut controller = Controller::new(backend, state, !config.quiet);
    let focused = config.charts_focused(std::io::stdout().is_terminal());
    let granularity = controller.set_focus(focused);
    debug!(ticks_per_sec = granularity.ticks_per_sec(), "Chart cadence selected");
    let reporter = Reporter::new(config.utc);

    info!(backend = %config.backend, "Console started");
    // camera and sensor servers are picked once their tab is active
    let server = config
        .server
        .as_deref()
        .filter(|_| matches!(command, Command::Bwtest(_) | Command::Nodes));
    controller
        .load_nodes(config.client.as_deref(), server)
        .await
        .context("Failed to load node lists")?;

    let result = match command {
        Command::Nodes => {
            print_nodes(&controller, &reporter);
            Ok(())
        }
        Command::Bwtest(args) => run_bwtest(&mut controller, &reporter, args).await,
        Command::Camera => run_app(&mut controller, &reporter, App::CamerApp, &config).await,
        Command::Sensor => run_app(&mut controller, &reporter, App::SensorApp, &config).await,
    };

    for notice in controller.state_mut().notices_mut().drain_history() {
        reporter.print_notice(&notice);
    }
    result
}

fn print_nodes<B: Backend>(controller: &Controller<B>, reporter: &Reporter) {
    let nodes = controller.state().nodes();
    if let Ok(clients) = nodes.options(NodeRole::Client, App::BwTester) {
        let selected = nodes.selected(NodeRole::Client, App::BwTester).ok();
        reporter.print_nodes("Clients:", clients, selected);
    }
    for app in App::ALL {
        match nodes.options(NodeRole::Server, app) {
            Ok(servers) => {
                let selected = nodes.selected(NodeRole::Server, app).ok();
                reporter.print_nodes(&format!("Servers for {}:", app), servers, selected);
            }
            Err(e) => debug!(app = %app, error = %e, "No server list"),
        }
    }
}

async fn run_bwtest<B: Backend>(
    controller: &mut Controller<B>,
    reporter: &Reporter,
    args: BwtestArgs,
) -> Result<()> {
    for (direction, params, lock, bw) in [
        (Direction::ClientToServer, args.cs, args.lock_cs, args.bw_cs),
        (Direction::ServerToClient, args.sc, args.lock_sc, args.bw_sc),
    ] {
        let state = controller.state_mut();
        state
            .load_dials(direction, DialSet::from_parameters(params))
            .with_context(|| format!("Invalid {} test parameters", direction.tag()))?;
        state.set_lock(direction, lock);
        if let Some(mbps) = bw {
            controller.on_dial_changed(direction, DialField::Bandwidth, mbps);
        }
    }

    let state = controller.state_mut();
    if let Some(seconds) = args.interval {
        let applied = state.set_interval(seconds);
        debug!(requested = seconds, applied = applied, "Continuous interval set");
    }
    if args.continuous && !state.set_continuous(true) {
        anyhow::bail!("Continuous testing is only available for the bandwidth test");
    }

    let mut runs = 0usize;
    let limit = if args.continuous { args.runs } else { Some(1) };
    tokio::select! {
        completed = controller.run_bwtest(limit, |state, result| {
            reporter.print_result(state.dials(), result, now_ms());
        }) => {
            runs = completed?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            println!("\n{}", "Interrupted, stopping continuous testing.".yellow());
        }
    }
    controller.state_mut().stop();

    if runs > 1 || args.continuous {
        reporter.print_charts(controller.state().charts());
        reporter.print_stats(controller.state().stats());
    }
    Ok(())
}

async fn run_app<B: Backend>(
    controller: &mut Controller<B>,
    reporter: &Reporter,
    app: App,
    config: &Config,
) -> Result<()> {
    if !controller.switch_tab(app) {
        anyhow::bail!("Cannot switch to {} while a command is running", app);
    }
    if let Some(server) = config.server.as_deref() {
        controller
            .state_mut()
            .nodes_mut()
            .select_named(NodeRole::Server, app, server)?;
    }

    match controller.run_command().await? {
        Outcome::Camera { fetch_image } => {
            reporter.print_output(controller.state());
            if fetch_image && controller.state().image().is_none() {
                println!("{}", "Image could not be retrieved.".red());
            }
        }
        _ => reporter.print_output(controller.state()),
    }
    Ok(())
}
