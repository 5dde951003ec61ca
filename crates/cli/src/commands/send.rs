//! `conduit send`: Push one message through the pipeline.

use conduit::bootstrap;
use conduit_core::context::ContextItem;
use conduit_core::event::EventResponse;

pub async fn run(
    message: String,
    conversation: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let (handle, task) = bootstrap::build_runtime(&config)?.start();

    let mut metadata = serde_json::Map::new();
    if let Some(id) = conversation {
        metadata.insert("conversation_id".into(), id.into());
    }

    let (event_id, rx) = handle.send(ContextItem::message("cli", message), "cli", metadata)?;
    tracing::debug!(event_id = %event_id.0, "Message queued");

    let response = rx.await;
    handle.shutdown();
    task.await?;

    match response? {
        EventResponse::Content { content, .. } => {
            println!("{content}");
            Ok(())
        }
        EventResponse::Error { kind, message } => Err(format!("{kind}: {message}").into()),
    }
}
