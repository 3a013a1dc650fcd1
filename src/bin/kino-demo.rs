//! Minimal embedder: load a file, print the event stream as JSON
//! lines until shutdown.
//!
//! Run with the file to "play" as the only argument:
//!   kino-demo test.mkv

use anyhow::{bail, Result};
use kino::{Client, EventData, EventKind};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "test.mkv".to_string());

    let mut client = match Client::create() {
        Ok(client) => client,
        Err(err) => bail!("failed creating context: {}", err),
    };
    client.request_log_messages("info")?;

    if client.initialize().is_err() {
        bail!("failed initializing");
    }
    client.command(&["loadfile", path.as_str()])?;

    // Let it play; quit once the event stream goes quiet.
    let mut idle_polls = 0;
    loop {
        let event = client.wait_event(2.0);
        match &event.data {
            EventData::LogMessage(msg) => {
                println!("[{}] {}: {}", msg.prefix, msg.level, msg.text)
            }
            _ => println!("event: {}", serde_json::to_string(&event).unwrap_or_default()),
        }
        match event.kind {
            EventKind::Shutdown => break,
            EventKind::None => {
                idle_polls += 1;
                if idle_polls == 2 {
                    client.command(&["quit"])?;
                }
            }
            _ => idle_polls = 0,
        }
    }

    client.destroy();
    Ok(())
}
