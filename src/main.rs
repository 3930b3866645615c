//! Reference Picteus extension - speaks the wire protocol on stdin/stdout.
//!
//! Handles:
//! - lifecycle: ready (log + notification), settings, terminate
//! - image.created / updated / deleted: log the touched image
//! - process.runCommand: `askForSomething`, `dialog`, `show`
//! - image.runCommand: show the selected images back to the user
//! - text.computeEmbeddings: toy hashing embedder behind the resource guard,
//!   computed on the offload pool

use clap::Parser;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use picteus_extension::events::{ImageCommand, ImageEvent, ProcessCommand, TextEmbeddingsRequest};
use picteus_extension::intent::{
    DialogIntent, ImagesIntent, ParametersIntent, ShowIntent, ShowType, UiAnchor, UiIntent,
};
use picteus_extension::{
    handler_fn, observability, stdio, Config, Context, Dispatcher, Error, Event, EventKind,
    ExtensionId, HandlerRegistry, LogLevel, Result,
};

const EMBEDDER_KEY: &str = "text-embedder";
const EMBEDDING_DIM: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "picteus-extension", version, about = "Reference Picteus extension over stdio")]
struct Args {
    /// Extension identifier, as declared in the manifest.
    #[arg(long, env = "PICTEUS_EXTENSION_ID", default_value = "example-rust")]
    extension_id: String,

    /// Optional JSON runtime configuration file.
    #[arg(long, env = "PICTEUS_EXTENSION_CONFIG")]
    config: Option<PathBuf>,

    /// How long the writer may flush queued frames on exit.
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    flush_timeout: Duration,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env()?;

    observability::init_tracing(&config.observability);

    let extension_id = ExtensionId::from_string(args.extension_id).map_err(Error::validation)?;
    let (transport, tasks) = stdio(&config.transport);
    let dispatcher = Dispatcher::new(extension_id, &config, transport);

    let shutdown = dispatcher.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            shutdown.shutdown();
        }
    });

    let summary = dispatcher.dispatch(registry()).await;
    tracing::info!(?summary, "Extension stopped");

    tasks.shutdown(args.flush_timeout).await;
    Ok(())
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .on(EventKind::Ready, handler_fn(on_ready))
        .on(EventKind::Settings, handler_fn(on_settings))
        .on(EventKind::Terminate, handler_fn(on_terminate))
        .on(EventKind::ImageCreated, handler_fn(on_image_touched))
        .on(EventKind::ImageUpdated, handler_fn(on_image_touched))
        .on(EventKind::ImageDeleted, handler_fn(on_image_touched))
        .on(EventKind::ImageRunCommand, handler_fn(on_image_command))
        .on(EventKind::ProcessRunCommand, handler_fn(on_process_command))
        .on(EventKind::TextComputeEmbeddings, handler_fn(on_text_embeddings))
}

async fn on_ready(ctx: Context, _event: Event) -> Result<Option<Value>> {
    ctx.log(
        LogLevel::Info,
        format!("The extension '{}' is ready", ctx.extension_id()),
    )
    .await?;
    ctx.notify(json!({"key": "value"})).await?;
    Ok(None)
}

async fn on_settings(ctx: Context, _event: Event) -> Result<Option<Value>> {
    ctx.log(
        LogLevel::Debug,
        format!(
            "The extension with id '{}' was notified that the settings have been set",
            ctx.extension_id()
        ),
    )
    .await?;
    Ok(None)
}

async fn on_terminate(ctx: Context, _event: Event) -> Result<Option<Value>> {
    tracing::debug!(extension_id = %ctx.extension_id(), "Extension is terminating");
    Ok(None)
}

async fn on_image_touched(ctx: Context, event: Event) -> Result<Option<Value>> {
    let image: ImageEvent = event.decode()?;
    ctx.log(
        LogLevel::Info,
        format!("The image with id '{}' was touched ({})", image.id, event.kind),
    )
    .await?;
    Ok(None)
}

async fn on_image_command(ctx: Context, event: Event) -> Result<Option<Value>> {
    let command: ImageCommand = event.decode()?;
    ctx.log(
        LogLevel::Debug,
        format!(
            "Received an image command with id '{}' for the images {:?}",
            command.command_id, command.image_ids
        ),
    )
    .await?;

    if command.image_ids.is_empty() {
        return Ok(None);
    }
    ctx.send_intent(ImagesIntent::new(
        command.image_ids,
        "Selected images",
        format!("Images processed by the '{}' command", command.command_id),
    ))
    .await?;
    Ok(None)
}

async fn on_process_command(ctx: Context, event: Event) -> Result<Option<Value>> {
    let command: ProcessCommand = event.decode()?;
    ctx.log(
        LogLevel::Debug,
        format!(
            "Received a process command with id '{}' with parameters '{}'",
            command.command_id, command.parameters
        ),
    )
    .await?;

    match command.command_id.as_str() {
        "askForSomething" => ask_for_something(&ctx).await?,
        "dialog" => {
            let answer = ctx
                .send_intent(
                    DialogIntent::question("Dialog", "This is a dialog question", "Yes", "No")
                        .with_details("Please, click the right button."),
                )
                .await?;
            let button = if answer == Value::Bool(true) { "Yes" } else { "No" };
            ctx.log(
                LogLevel::Info,
                format!("The user clicked the '{}' button", button),
            )
            .await?;
        }
        "show" => match command.str_param("type") {
            Some("extensionSettings") => {
                ctx.send_intent(ShowIntent {
                    show_type: ShowType::ExtensionSettings,
                    id: ctx.extension_id().to_string(),
                })
                .await?;
            }
            other => {
                ctx.log(LogLevel::Error, format!("Unhandled type '{:?}'", other))
                    .await?;
            }
        },
        other => {
            ctx.log(LogLevel::Warn, format!("Unknown command '{}'", other))
                .await?;
        }
    }
    Ok(None)
}

async fn ask_for_something(ctx: &Context) -> Result<()> {
    let schema = json!({
        "type": "object",
        "properties": {
            "favoriteColor": {
                "title": "Favorite color",
                "description": "What is your favorite color?",
                "type": "string",
                "default": "pink"
            },
            "likeChocolate": {
                "title": "Chocolate?",
                "description": "Do you like chocolate?",
                "type": "boolean"
            }
        },
        "required": ["favoriteColor"]
    });

    match ctx.send_intent(ParametersIntent::new(schema)).await {
        Ok(answer) => {
            ctx.log(
                LogLevel::Info,
                format!("Received the intent result '{}'", answer),
            )
            .await?;
            if answer["likeChocolate"] == Value::Bool(true) {
                ctx.send_intent(UiIntent {
                    anchor: UiAnchor::Modal,
                    url: "https://www.milka.fr".to_string(),
                })
                .await?;
            }
        }
        Err(Error::IntentRejected(reason)) => {
            ctx.log(
                LogLevel::Error,
                format!("Received the intent error with reason '{}'", reason),
            )
            .await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn on_text_embeddings(ctx: Context, event: Event) -> Result<Option<Value>> {
    let request: TextEmbeddingsRequest = event.decode()?;
    let cache_dir = ctx.cache_dir().map(Path::to_path_buf);
    let embedder = ctx
        .get_resource(EMBEDDER_KEY, || async move {
            Ok(HashingEmbedder::load(EMBEDDING_DIM, cache_dir.as_deref()))
        })
        .await?;

    ctx.log(
        LogLevel::Info,
        format!("Computing text embeddings for the text {}", request.text),
    )
    .await?;
    let embedding = ctx
        .offload(move || Ok(embedder.embed(&request.text)))
        .await?;
    Ok(Some(json!(embedding)))
}

/// Bag-of-words feature hashing. Stands in for a real text encoder.
#[derive(Debug)]
struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    fn load(dim: usize, cache_dir: Option<&Path>) -> Self {
        tracing::info!(dim, cache_dir = ?cache_dir, "Loading text embedder");
        Self { dim }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() % self.dim as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_timeout_parses_human_durations() {
        let args = Args::try_parse_from(["picteus-extension", "--flush-timeout", "1m 500ms"]).unwrap();
        assert_eq!(args.flush_timeout, Duration::from_millis(60_500));

        let args = Args::try_parse_from(["picteus-extension"]).unwrap();
        assert_eq!(args.flush_timeout, Duration::from_secs(2));

        assert!(Args::try_parse_from(["picteus-extension", "--flush-timeout", "soon"]).is_err());
    }
}
