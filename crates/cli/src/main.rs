use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use agrilm_common::{ComputeBackend, EngineError, RuntimeConfig, SamplingStrategy};
use agrilm_infer::{
    build_chat_prompt, ChatTurn, InferenceBridge, InferenceSession, InitRequest, MethodCall,
    MethodResponse,
};
use agrilm_tokenizer::TokenizerLoader;

#[derive(Parser, Debug)]
#[command(name = "agrilm", about = "On-device text generation for the farming assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a completion for one prompt.
    Generate(GenerateArgs),
    /// Interactive prompt loop against a loaded model.
    Chat(ChatArgs),
    /// Show how a tokenizer splits text.
    Tokenize(TokenizeArgs),
    /// Serve the method channel as JSON lines on stdin/stdout.
    Bridge(BridgeArgs),
}

// ── Shared options ─────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Runtime config JSON; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// cpu, cpu+gpu, accelerated or auto (host spellings such as cpuOnly also work).
    #[arg(long)]
    compute: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    /// Sample only from the smallest token set whose probability exceeds this.
    #[arg(long)]
    top_p: Option<f32>,
    /// Always take the most likely token.
    #[arg(long)]
    greedy: bool,
    #[arg(long)]
    seed: Option<u64>,
}

impl RuntimeArgs {
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => RuntimeConfig::default(),
        };
        if let Some(compute) = &self.compute {
            config.compute = compute.parse()?;
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(p) = self.top_p {
            config.top_p = p;
        }
        if self.greedy {
            config.strategy = SamplingStrategy::Greedy;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model directory (config.json + model.safetensors) or a .safetensors file.
    #[arg(long)]
    model: PathBuf,
    /// tokenizer.json or tokenizer.model; defaults to the one beside the model.
    #[arg(long)]
    tokenizer: Option<PathBuf>,
}

impl ModelArgs {
    fn request(&self, compute: ComputeBackend) -> InitRequest {
        InitRequest {
            model_path: self.model.clone(),
            tokenizer_path: self.tokenizer.clone(),
            compute,
        }
    }
}

// ── Subcommand args ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    model: ModelArgs,
    #[command(flatten)]
    runtime: RuntimeArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    max_tokens: Option<usize>,
}

#[derive(Parser, Debug)]
struct ChatArgs {
    #[command(flatten)]
    model: ModelArgs,
    #[command(flatten)]
    runtime: RuntimeArgs,
    #[arg(long)]
    max_tokens: Option<usize>,
    /// Replaces the configured system prompt.
    #[arg(long)]
    system_prompt: Option<String>,
    /// Earlier exchanges replayed into each prompt.
    #[arg(long, default_value_t = 4)]
    history_turns: usize,
}

#[derive(Parser, Debug)]
struct TokenizeArgs {
    /// tokenizer.json or tokenizer.model; the built-in vocabulary when omitted.
    #[arg(long)]
    tokenizer: Option<PathBuf>,
    #[arg(long, default_value_t = agrilm_tokenizer::MIN_VOCAB_TOKENS)]
    min_tokens: usize,
    text: String,
}

#[derive(Parser, Debug)]
struct BridgeArgs {
    #[command(flatten)]
    runtime: RuntimeArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => cmd_generate(args),
        Command::Chat(args) => cmd_chat(args),
        Command::Tokenize(args) => cmd_tokenize(args),
        Command::Bridge(args) => cmd_bridge(args),
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn load_session(model: &ModelArgs, runtime: &RuntimeArgs) -> Result<InferenceSession> {
    let config = runtime.runtime_config()?;
    let request = model.request(config.compute);
    let session = InferenceSession::new(config);

    eprintln!("Loading model from {} ...", model.model.display());
    session
        .load(&request)
        .with_context(|| format!("loading {}", model.model.display()))?;
    Ok(session)
}

fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let session = load_session(&args.model, &args.runtime)?;
    let max = args
        .max_tokens
        .unwrap_or(session.config().default_max_new_tokens);

    let output = session.generate(&args.prompt, max)?;
    println!("{}", output.text);

    let metrics = session.metrics();
    eprintln!(
        "{} tokens in {:.2}s ({:.1} tok/s), stopped: {}",
        metrics.last_generated_tokens,
        metrics.last_inference_time,
        metrics.tokens_per_second,
        output.stop_reason
    );
    if output.is_empty() {
        eprintln!("(empty generation, try another prompt or a higher temperature)");
    }
    Ok(())
}

fn cmd_chat(args: ChatArgs) -> Result<()> {
    let session = load_session(&args.model, &args.runtime)?;
    let max = args
        .max_tokens
        .unwrap_or(session.config().default_max_new_tokens);
    let system = args
        .system_prompt
        .clone()
        .unwrap_or_else(|| session.config().system_prompt.clone());
    let mut history: Vec<ChatTurn> = Vec::new();
    eprintln!("Ready. Type 'quit' to exit, 'reset' to forget the conversation.\n");

    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;
        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() || input == "quit" || input == "exit" {
            break;
        }
        if input == "reset" {
            history.clear();
            eprintln!("(conversation cleared)");
            continue;
        }
        let prompt = build_chat_prompt(&system, &history, input);
        let output = session.generate(&prompt, max)?;
        println!("AI: {}", output.text);

        history.push(ChatTurn::new(input, output.text));
        if history.len() > args.history_turns {
            history.remove(0);
        }
    }
    Ok(())
}

fn cmd_tokenize(args: TokenizeArgs) -> Result<()> {
    let loader = match &args.tokenizer {
        Some(path) => TokenizerLoader::for_path(path),
        None => TokenizerLoader::default(),
    };
    let tokenizer = loader.with_min_tokens(args.min_tokens).load();

    let ids = tokenizer.encode(&args.text);
    eprintln!("backend: {} ({} tokens)", tokenizer.name(), tokenizer.vocab_size());
    println!("{}", serde_json::to_string(&ids)?);
    println!("{}", tokenizer.decode(&ids));
    Ok(())
}

/// One `MethodCall` JSON object per input line, one `MethodResponse` per output line.
fn cmd_bridge(args: BridgeArgs) -> Result<()> {
    let bridge = InferenceBridge::new(args.runtime.runtime_config()?);
    tracing::info!("method channel reading JSON lines from stdin");
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<MethodCall>(&line) {
            Ok(call) => bridge.handle(&call),
            Err(e) => MethodResponse::from_error(&EngineError::InvalidArgument(e.to_string())),
        };
        serde_json::to_writer(&mut stdout, &response)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }
    bridge.dispose();
    Ok(())
}
