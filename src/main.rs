//! Sign stream CLI
//!
//! Serves the recognition pipeline over HTTP and replays recorded sessions
//! offline for threshold tuning.

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use signstream::{
    classifier::ScriptedClassifier,
    config::{Articulation, Config},
    landmarks::{Detection, JsonLandmarkExtractor},
    pipeline::{Dispatch, FrameRequest, IngestPipeline},
    VERSION,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "signstream")]
#[command(version = VERSION)]
#[command(about = "Turns streamed sign classifications into a stable sentence", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (overrides the configuration)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: std::net::IpAddr,

        /// Sequence classifier service URL (overrides the configuration)
        #[arg(long)]
        classifier_url: Option<String>,
    },

    /// Replay a recorded JSONL trace through the pipeline
    ///
    /// Each line is `{"t_ms": <u64>, "frame": <detection or null>, "scores": [..]}`.
    /// Scores are consumed in order by successive classifications; the last
    /// vector repeats once the trace runs out of them.
    Replay {
        /// Trace file
        trace: PathBuf,

        /// Client id to replay as
        #[arg(long, default_value = "replay")]
        client: String,

        /// Display language
        #[arg(long)]
        language: Option<String>,
    },

    /// List the configured signs
    Signs,

    /// Show configuration
    Config {
        /// Write the default configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

/// One line of a replay trace.
#[derive(Debug, Deserialize)]
struct TraceRecord {
    t_ms: u64,
    #[serde(default)]
    frame: Option<Detection>,
    #[serde(default)]
    scores: Option<Vec<f64>>,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            bind,
            classifier_url,
        } => {
            let config = load_config(cli.config.as_deref());
            cmd_serve(config, port, bind, classifier_url);
        }
        Commands::Replay {
            trace,
            client,
            language,
        } => {
            let config = load_config(cli.config.as_deref());
            cmd_replay(config, &trace, &client, language);
        }
        Commands::Signs => {
            let config = load_config(cli.config.as_deref());
            cmd_signs(&config);
        }
        Commands::Config { init } => {
            cmd_config(cli.config.as_deref(), init);
        }
    }
}

fn load_config(path: Option<&Path>) -> Config {
    let result = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(
    mut config: Config,
    port: Option<u16>,
    bind: std::net::IpAddr,
    classifier_url: Option<String>,
) {
    use signstream::classifier::{RemoteClassifier, RemoteClassifierConfig};
    use signstream::server::{run, ServerConfig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signstream=info")),
        )
        .init();

    if let Some(port) = port {
        config.port = port;
    }
    if classifier_url.is_some() {
        config.classifier_url = classifier_url;
    }

    println!("Sign Stream v{VERSION}");
    println!();

    let Some(url) = config.classifier_url.clone() else {
        eprintln!("Error: no classifier configured.");
        eprintln!("Pass --classifier-url or set classifier_url in {:?}", Config::config_path());
        std::process::exit(1);
    };

    let classifier = match RemoteClassifier::new(RemoteClassifierConfig::new(url.clone())) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    match classifier.test_connection() {
        Ok(true) => println!("  Classifier: {url} (OK)"),
        Ok(false) => eprintln!("Warning: classifier health check failed at {url}"),
        Err(e) => eprintln!("Warning: could not reach classifier at {url}: {e}"),
    }

    let server_config = ServerConfig::new(config.port).with_bind(bind);
    println!("  Workers: {}", config.worker.workers);
    println!("  Signs: {}", config.signs.len());

    let pipeline = match IngestPipeline::build(
        config,
        Arc::new(JsonLandmarkExtractor::new()),
        Arc::new(classifier),
        Dispatch::Pool,
    ) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            eprintln!("Error starting classification workers: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    let (addr, shutdown_tx) = match runtime.block_on(run(server_config, Arc::clone(&pipeline))) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Error starting server: {e}");
            std::process::exit(1);
        }
    };
    println!("  Listening on http://{addr}");
    println!();
    println!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!();
    println!("Stopping...");
    let _ = shutdown_tx.send(());
    runtime.shutdown_timeout(Duration::from_secs(2));

    println!();
    println!("{}", pipeline.stats().summary());
}

fn cmd_replay(config: Config, trace: &Path, client: &str, language: Option<String>) {
    let file = match File::open(trace) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening {trace:?}: {e}");
            std::process::exit(1);
        }
    };

    let classifier = Arc::new(ScriptedClassifier::new());
    let pipeline = match IngestPipeline::build(
        config,
        Arc::new(JsonLandmarkExtractor::new()),
        classifier.clone(),
        Dispatch::Inline,
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let start = Utc::now();
    let mut last_sentence = Vec::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error reading {trace:?}: {e}");
                std::process::exit(1);
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record: TraceRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                eprintln!("Warning: skipping line {}: {e}", line_no + 1);
                continue;
            }
        };

        let Some(now) = trace_instant(start, record.t_ms) else {
            eprintln!(
                "Warning: skipping line {}: timestamp {} ms out of range",
                line_no + 1,
                record.t_ms
            );
            continue;
        };

        if let Some(scores) = record.scores {
            classifier.push(scores);
        }

        // A null frame replays as a failed extraction.
        let payload = serde_json::to_vec(&record.frame).unwrap_or_default();
        let mut request = FrameRequest::new(client, payload);
        if let Some(language) = &language {
            request = request.with_language(language.clone());
        }

        match pipeline.ingest_at(request, now) {
            Ok(snapshot) => {
                if let Some(label) = &snapshot.committed {
                    println!(
                        "[{:>7} ms] + {:<12} sentence: {}",
                        record.t_ms,
                        label,
                        snapshot.sentence.join(" ")
                    );
                }
                last_sentence = snapshot.sentence;
            }
            Err(e) => {
                println!("[{:>7} ms] ! {}", record.t_ms, e);
            }
        }
    }

    println!();
    println!("Final sentence: {}", last_sentence.join(" "));
    println!();
    println!("{}", pipeline.stats().summary());
}

/// Trace time `t_ms` after `start`, or `None` when it does not fit.
fn trace_instant(start: DateTime<Utc>, t_ms: u64) -> Option<DateTime<Utc>> {
    let offset = TimeDelta::try_milliseconds(i64::try_from(t_ms).ok()?)?;
    start.checked_add_signed(offset)
}

fn cmd_signs(config: &Config) {
    println!("Signs");
    println!("=====");
    println!();
    println!("{:<3} {:<12} {:<8} {:>6} {:>9}  rule", "#", "label", "kind", "weight", "cooldown");
    for (i, sign) in config.signs.iter().enumerate() {
        let kind = match sign.articulation {
            Articulation::Static => "static",
            Articulation::Dynamic => "dynamic",
        };
        let rule = sign
            .rule
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string))
            .unwrap_or_else(|| "generic".to_string());
        println!(
            "{:<3} {:<12} {:<8} {:>6.2} {:>8}ms  {}{}",
            i,
            sign.label,
            kind,
            sign.weight,
            sign.cooldown.as_millis(),
            rule,
            if sign.scrutiny.is_some() { " (scrutinized)" } else { "" }
        );
    }
}

fn cmd_config(path: Option<&Path>, init: bool) {
    if init {
        let config = Config::default();
        let result = match path {
            Some(path) => config.save_to(path),
            None => config.save(),
        };
        if let Err(e) = result {
            eprintln!("Error writing configuration: {e}");
            std::process::exit(1);
        }
    }

    let config = load_config(path);

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.map(Path::to_path_buf).unwrap_or_else(Config::config_path)
    );
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
