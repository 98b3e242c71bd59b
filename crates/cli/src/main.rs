//! gemini-ask: ask the Gemini web UI a question from the command line.
//!
//! Prints the answer to stdout; all diagnostics go to stderr so the output
//! can be piped.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gemini_automation::{AutomationConfig, DetectorConfig, GeminiAutomation, SystemPrompt};

#[derive(Parser, Debug)]
#[command(name = "gemini-ask", about = "Ask Gemini a question through a local Chrome")]
struct Cli {
    /// The question. Reads stdin when omitted and stdin is not a terminal.
    question: Option<String>,

    /// DevTools debugging port
    #[arg(short, long, default_value_t = 9222, env = "GEMINI_ASK_PORT")]
    port: u16,

    /// DevTools host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Seconds to wait for the reply to settle
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Write a screenshot here before closing
    #[arg(short, long)]
    screenshot: Option<PathBuf>,

    /// Delay between synthetic keystrokes, in milliseconds
    #[arg(long, default_value_t = 50)]
    typing_delay_ms: u64,

    /// Fail instead of starting Chrome when nothing is listening
    #[arg(long)]
    no_auto_launch: bool,

    /// Launch Chrome headless
    #[arg(long)]
    headless: bool,

    /// Minimize the browser window after connecting
    #[arg(long)]
    minimized: bool,

    /// Leave a launched browser running on exit
    #[arg(long)]
    keep_browser: bool,

    /// Print only the answer, suitable for scripts
    #[arg(long)]
    pipe: bool,

    /// Suppress progress logging
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the system prompt appended to the question
    #[arg(long, env = "GEMINI_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Send the question with no system prompt at all
    #[arg(long, conflicts_with = "system_prompt")]
    no_system_prompt: bool,

    /// Print the resolved system prompt and exit
    #[arg(long)]
    show_prompt: bool,

    /// Chrome profile directory for a launched browser
    #[arg(long)]
    user_data_dir: Option<PathBuf>,
}

impl Cli {
    fn system_prompt(&self) -> SystemPrompt {
        if self.no_system_prompt {
            SystemPrompt::Disabled
        } else if let Some(text) = &self.system_prompt {
            SystemPrompt::Custom(text.clone())
        } else {
            SystemPrompt::Resolved
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet || (cli.pipe && !cli.verbose);

    let filter = if quiet {
        "error"
    } else if cli.verbose {
        "gemini_automation=debug,gemini_ask=debug"
    } else {
        "gemini_automation=info,gemini_ask=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let system_prompt = cli.system_prompt();
    if cli.show_prompt {
        match system_prompt.resolve() {
            Some(prompt) => println!("{prompt}"),
            None => println!("(none)"),
        }
        return Ok(());
    }

    let question = match cli.question {
        Some(question) => question,
        None if !std::io::stdin().is_terminal() => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading question from stdin")?;
            buf.trim().to_string()
        }
        None => bail!("no question given; pass it as an argument or pipe it on stdin"),
    };
    if question.is_empty() {
        bail!("the question is empty");
    }

    let config = AutomationConfig {
        host: cli.host,
        port: cli.port,
        auto_launch: !cli.no_auto_launch,
        headless: cli.headless,
        user_data_dir: cli.user_data_dir,
        typing_delay: Duration::from_millis(cli.typing_delay_ms),
        start_minimized: cli.minimized,
        keep_browser: cli.keep_browser,
        screenshot_path: cli.screenshot,
        websocket_url: None,
        command_timeout: Duration::from_secs(10),
        detector: DetectorConfig::default(),
        target_url_pattern: "gemini.google.com".to_string(),
        system_prompt,
    };
    let timeout = Duration::from_secs(cli.timeout);

    let mut gemini = GeminiAutomation::new(config);
    let outcome = run(&mut gemini, &question, timeout).await;
    // Tear down even when asking failed, so a launched browser and its
    // profile are not leaked.
    gemini.close().await;

    let response = outcome?;
    println!("{response}");
    Ok(())
}

async fn run(
    gemini: &mut GeminiAutomation,
    question: &str,
    timeout: Duration,
) -> anyhow::Result<String> {
    gemini.connect().await.context("connecting to the browser")?;
    let response = gemini
        .ask_question(question, timeout)
        .await
        .context("asking the question")?;
    Ok(response)
}
