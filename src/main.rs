use dotenvy::dotenv;
use linkdrop::bot::handlers::{self, BotIdentity, Command};
use linkdrop::config::{Settings, RETRY_PREFIX};
use linkdrop::store::{JsonFileStore, MediaStore};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from log output
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting linkdrop relay bot...");

    // Load settings
    let settings = init_settings();
    if settings.admin_id().is_none() {
        warn!("ADMIN_ID is missing or not numeric; admin uploads are disabled.");
    }

    // Load the key store
    let store = init_store(&settings).await;

    // Initialize Bot
    let bot = Bot::new(settings.telegram_token.clone());

    // Resolve the bot's public username for deep links
    let identity = init_identity(&bot).await;

    // Setup handlers
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![store, settings, identity])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_store(settings: &Settings) -> Arc<dyn MediaStore> {
    let store = JsonFileStore::load(&settings.store_path).await;
    info!(
        "Key store loaded from {} ({} entries).",
        settings.store_path,
        store.len().await
    );
    Arc::new(store)
}

async fn init_identity(bot: &Bot) -> Arc<BotIdentity> {
    match bot.get_me().await {
        Ok(me) => {
            let username = me.username().to_string();
            info!("Authorized as @{username}.");
            Arc::new(BotIdentity { username })
        }
        Err(e) => {
            error!("Failed to fetch bot identity: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(|q: CallbackQuery| {
                    q.data
                        .as_deref()
                        .is_some_and(|data| data.starts_with(RETRY_PREFIX))
                })
                .endpoint(handle_retry),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    // Media uploads are only accepted from the administrator;
                    // everyone else's media is ignored with no response.
                    dptree::filter(|msg: Message, settings: Arc<Settings>| {
                        handlers::is_admin(&msg, &settings)
                    })
                    .branch(
                        Update::filter_message()
                            .filter(|msg: Message| msg.photo().is_some())
                            .endpoint(handle_admin_photo),
                    )
                    .branch(
                        Update::filter_message()
                            .filter(|msg: Message| msg.video().is_some())
                            .endpoint(handle_admin_video),
                    ),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<dyn MediaStore>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    let Command::Start(args) = cmd;
    if let Err(e) = handlers::start(bot, msg, store, settings, args).await {
        error!("Start handler error: {}", e);
    }
    respond(())
}

async fn handle_admin_photo(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    identity: Arc<BotIdentity>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::admin_photo(bot, msg, store, identity).await {
        error!("Admin photo handler error: {}", e);
    }
    respond(())
}

async fn handle_admin_video(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    identity: Arc<BotIdentity>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::admin_video(bot, msg, store, identity).await {
        error!("Admin video handler error: {}", e);
    }
    respond(())
}

async fn handle_retry(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<dyn MediaStore>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::retry(bot, q, store, settings).await {
        error!("Retry handler error: {}", e);
    }
    respond(())
}
