use log_tailer::{SequenceEvent, tail_log};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <file_path>", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];

    let file = match tail_log(file_path).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening log file: {}", e);
            process::exit(1);
        }
    };

    // Subscribe before taking the snapshot so no batch falls between the two.
    let mut events = file.records().subscribe();
    let printed = file.records().len();
    for record in file.records().iter().take(printed) {
        println!("{}", record);
    }

    while let Some(event) = events.recv().await {
        if let SequenceEvent::ItemsAdded { start_index, items } = event {
            if start_index < printed {
                continue;
            }
            for record in items.iter() {
                println!("{}", record);
            }
        }
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
