use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use ah_midi_osc::config::{self, AppConfig};
use ah_midi_osc::general::check::{self, StatusSources};
use ah_midi_osc::general::forwarder::{spawn_forwarder, EventProcessor};
use ah_midi_osc::general::queue::ingest_queue;
use ah_midi_osc::general::stdin_handler::spawn_stdin_handler;
use ah_midi_osc::io::input::open_input;
use ah_midi_osc::midi::MidiDecoder;
use ah_midi_osc::remote::osc_sender::Dispatcher;
use ah_midi_osc::template::TemplateEngine;
use ah_midi_osc::{Result, EXIT_FLAG};
use env_logger::Env;
use log::{error, info, warn, LevelFilter};

fn main() {
    if let Err(err) = run() {
        error!(target: "bridge", "{}", err);
        check::print_bridge_failed(&err.to_string());
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(level: LevelFilter) {
    let from_env = env::var_os("RUST_LOG").is_some();
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("debug,mdns_sd=info"));
    builder.format_timestamp_millis();
    if builder.try_init().is_ok() && !from_env {
        // Keep debug records reachable for the `debug on` console command.
        log::set_max_level(level);
    }
}

fn run() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("app_config.json"));
    let config = AppConfig::load(&config_path)?;
    init_logging(config.log_level()?);
    let config = config::init_config(config).unwrap_or_else(|_| config::get_config());
    let app_name = config.app_options.application_name.as_str();
    info!(target: "config", "{} using {}", app_name, config_path.display());

    let engine = TemplateEngine::load(&config.templates_path())?;
    let midi = &config.midi_options;
    let decoder = MidiDecoder::new(midi.sysex_layouts.clone(), midi.nrpn_timeout());
    let dispatcher = Dispatcher::connect_udp(&config.osc_options)?;
    let targets: Vec<_> = dispatcher.targets().cloned().collect();

    let (producer, consumer) = ingest_queue(midi.queue_size_limit);
    let queue_stats = producer.stats();
    let processor = EventProcessor::new(decoder, engine, dispatcher);
    let pipeline_stats = processor.stats();
    let worker = spawn_forwarder(consumer, processor)?;

    let input = match open_input(app_name, midi, producer) {
        Ok(input) => input,
        Err(e) => {
            // The producer is gone, so the worker is already on its way out.
            if let Ok(processor) = worker.join() {
                processor.into_dispatcher().shutdown(config.osc_options.shutdown_grace());
            }
            return Err(e);
        }
    };

    #[cfg(feature = "mdns")]
    let registration = config.osc_options.listen.as_ref().and_then(|listen| {
        ah_midi_osc::remote::discovery::ServiceRegistration::register(listen)
            .map_err(|e| warn!(target: "mdns", "{}", e))
            .ok()
    });

    check::print_bridge_active(input.port_name(), targets.len());
    let stdin_handle = spawn_stdin_handler(StatusSources {
        queue: queue_stats,
        pipeline: pipeline_stats,
        targets,
    });

    while !EXIT_FLAG.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    info!(target: "bridge", "closing connections and exiting...");
    input.close();
    match worker.join() {
        Ok(processor) => {
            let detached = processor
                .into_dispatcher()
                .shutdown(config.osc_options.shutdown_grace());
            if detached > 0 {
                warn!(target: "bridge", "{} OSC target(s) still busy at exit", detached);
            }
        }
        Err(_) => error!(target: "bridge", "decoder thread panicked"),
    }

    #[cfg(feature = "mdns")]
    if let Some(registration) = registration {
        registration.deregister();
    }

    let _ = stdin_handle.join();
    Ok(())
}
