use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use ndsepics::{
    DataType, Interface, InterfaceBuilder, PvError, ScanType, UnixTime, Value, VariableBuilder,
    asyn::{AsynDriver, AsynLink, AsynStatus, PortDriver},
};
use tokio::select;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Options {
    /// Show debug output
    #[clap(short, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Name of the asyn port
    #[clap(long, default_value = "NDS")]
    port: String,
    /// Interval between simulated temperature readings
    #[clap(long, default_value_t = 1000)]
    period_ms: u64,
    /// Where to write the generated database
    #[clap(long)]
    db_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 1)]
async fn main() {
    // Make sure panics from threads cause the whole process to terminate
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
    let opts = Options::parse();
    let filter = EnvFilter::default().add_directive(
        match opts.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            2.. => LevelFilter::TRACE,
        }
        .into(),
    );
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = Arc::new(PortDriver::new(&opts.port));
    let mut builder = InterfaceBuilder::new(port.clone());
    if let Some(dir) = opts.db_dir {
        builder = builder.database_dir(dir);
    }
    let interface = builder.build();

    let temperature = VariableBuilder::new(&opts.port, "Node-Temperature", DataType::Float64)
        .external_name(&format!("{}-Node-Temperature", opts.port))
        .description("Simulated temperature")
        .scan(ScanType::Interrupt)
        .build();
    let setpoint = VariableBuilder::new(&opts.port, "Node-Setpoint", DataType::Float64)
        .external_name(&format!("{}-Node-Setpoint", opts.port))
        .description("Temperature setpoint")
        .output()
        .initial_value(20.0)
        .process_at_init(true)
        .on_write(|_, value| match value {
            Value::Float64(v) if !(-50.0..=150.0).contains(v) => {
                Err(PvError::runtime("Setpoint out of range"))
            }
            _ => Ok(()),
        })
        .build();
    let reset = VariableBuilder::new(&opts.port, "Node-Reset", DataType::Int32)
        .external_name(&format!("{}-Node-Reset", opts.port))
        .description("Reset the node")
        .action()
        .build();
    for pv in [&temperature, &setpoint, &reset] {
        pv.initialize(&interface).unwrap();
    }

    // Stand in for an I/O Intr record on the temperature
    let link: AsynLink = format!("@asyn({}, 0)Node-Temperature", opts.port)
        .parse()
        .unwrap();
    let subscriber = interface.connect(&link).unwrap();
    port.interrupts()
        .float64
        .add(subscriber, |user, value| {
            info!("Temperature {value:.2} at {:?}", user.timestamp);
        });

    let database = interface.registration_terminated().unwrap();
    info!("Records loaded from {}", database.display());

    // An IOC write to the action, acknowledged by the device
    let mut user = interface
        .connect(&AsynLink::new(&opts.port, 0, "Node-Reset"))
        .unwrap();
    if interface.write_int32(&mut user, 1) == AsynStatus::Success {
        reset.acknowledge(UnixTime::now(), 1).unwrap();
    }

    let mut reading = 20.0f64;
    loop {
        select! {
            _ = tokio::time::sleep(Duration::from_millis(opts.period_ms)) => (),
            _ = tokio::signal::ctrl_c() => {
                println!("Ctrl-C: Shutting down");
                break;
            },
        };
        let (_, target) = setpoint.load();
        if let Value::Float64(target) = target {
            reading += (target - reading) * 0.1;
        }
        if let Err(e) = temperature.set_value(UnixTime::now(), reading) {
            warn!("Could not push temperature: {e}");
        }
    }
}
