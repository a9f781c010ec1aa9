use log_tailer::{SequenceEvent, tail_log};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tail a log file and print records as they are parsed
    let file = tail_log("fixtures/mixed_records.log").await?;
    let mut events = file.records().subscribe();

    println!("Existing records:");
    for (i, record) in file.records().iter().enumerate() {
        println!("  [{}]: {}", i, record);
    }

    println!("Watching for new records...");

    let mut count = 0;
    while let Some(event) = events.next().await {
        if let SequenceEvent::ItemsAdded { start_index, items } = event {
            println!("Received batch #{} with {} records:", count + 1, items.len());
            for (i, record) in items.iter().enumerate() {
                println!("  [{}]: {}", start_index + i, record);
            }
            println!("---");

            count += 1;
            if count >= 2 {
                // Only show first couple of batches for demo
                break;
            }
        }
    }

    Ok(())
}
