use std::io::Write;
use std::process::exit;
use std::time::Duration;

use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::time;

use tapswitch::config::SwitchConfig;
use tapswitch::error::Error;
use tapswitch::linuxinterface::{interfaces, raw_interface};
use tapswitch::report::{format_counters, format_table};
use tapswitch::switch;

#[macro_use]
extern crate log;

use env_logger::Env;

#[derive(StructOpt, Debug)]
#[structopt(name = "tapswitch")]
/// Two port ethernet learning switch
struct Opt {
    #[structopt(short, long)]
    /// list network interfaces and exit
    list: bool,
    #[structopt(short = "a", long, env = "TAPSWITCH_PORT_A")]
    /// interface bound to port A
    port_a: Option<String>,
    #[structopt(short = "b", long, env = "TAPSWITCH_PORT_B")]
    /// interface bound to port B
    port_b: Option<String>,
    #[structopt(short, long, default_value = "300", env = "TAPSWITCH_TIMEOUT")]
    /// mac aging timeout in seconds, fractions allowed
    timeout: f64,
    #[structopt(short, long, default_value = "200", env = "TAPSWITCH_SWEEP_MS")]
    /// aging sweep interval in milliseconds
    sweep_interval_ms: u64,
    #[structopt(short, long, default_value = "32000", env = "TAPSWITCH_MAX_ENTRIES")]
    /// maximum number of learned macs
    max_entries: usize,
}

fn build_config(args: &Opt) -> Result<SwitchConfig, Error> {
    let port_a = args.port_a.clone().ok_or("missing --port-a")?;
    let port_b = args.port_b.clone().ok_or("missing --port-b")?;
    let config = SwitchConfig::new(port_a, port_b, args.timeout, args.sweep_interval_ms)?
        .with_max_entries(args.max_entries)?;
    Ok(config)
}

fn print_interfaces() {
    println!("+-----+---------------------+-------------------+-----------------------------+");
    println!("| {:<4}| {:<20}| {:<18}| {:<28}|", "#", "Name", "MAC", "IP");
    println!("+-----+---------------------+-------------------+-----------------------------+");
    for iface in interfaces() {
        let mac = iface.mac.map(|m| m.to_string().to_uppercase()).unwrap_or_default();
        let ip = iface.ips.first().map(|ip| ip.to_string()).unwrap_or_default();
        println!("| {:<4}| {:<20}| {:<18}| {:<28}|", iface.index, iface.name, mac, ip);
        println!("+-----+---------------------+-------------------+-----------------------------+");
    }
}

fn print_menu() {
    println!("\n1. Print switching table");
    println!("2. Print packets count");
    println!("3. Exit");
    print!("Option: ");
    let _ = std::io::stdout().flush();
}

async fn run(config: SwitchConfig) -> Result<(), Error> {
    let port_a = raw_interface(&config.port_a, config.channel_capacity)?;
    let port_b = raw_interface(&config.port_b, config.channel_capacity)?;

    let handle = switch::start(&config, port_a, port_b);

    let (interrupt_tx, mut interrupt_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(true);
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut interval = time::interval(Duration::from_secs(1));

    print_menu();
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    match line.trim() {
                        "1" => print!("{}", format_table(&handle.snapshot())),
                        "2" => print!("\n{}", format_counters(&handle.counters())),
                        "3" => break,
                        other => warn!("unknown option: {:?}", other),
                    }
                    print_menu();
                }
                Ok(None) => {
                    info!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = interrupt_rx.changed() => {
                println!();
                break;
            }
            _ = interval.tick() => {
                if handle.engines_finished() {
                    error!("both capture sources ended");
                    break;
                }
            }
        }
    }

    let totals = handle.shutdown().await;
    println!("Total count");
    print!("\n{}", format_counters(&totals));
    println!("Bye!");
    Ok(())
}

fn main() {
    let env = Env::default()
        .filter_or("TAPSWITCH_LOG_LEVEL", "info")
        .write_style_or("TAPSWITCH_LOG_STYLE", "always");

    env_logger::init_from_env(env);

    let args = Opt::from_args();

    debug!("args: {:?}", args);

    if args.list {
        print_interfaces();
        return;
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    };

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("cannot start runtime: {}", e);
            exit(1);
        }
    };
    let result = runtime.block_on(run(config));
    runtime.shutdown_timeout(Duration::from_secs(0));

    if let Err(e) = result {
        error!("{}", e);
        exit(1);
    }
}
