#![allow(missing_docs)]

//! Outdial CLI — trigger and inspect AI-voiced outbound calls.
//!
//! Subcommands:
//! - `init` — create the runtime directory layout with a sample template
//! - `templates` — list loaded call templates
//! - `check` — report present/missing upstream credentials for a template
//! - `call` — build a call request and run the orchestration flow

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use outdial::config::{runtime_paths, RuntimePaths, TemplateStore};
use outdial::credentials::{
    enforce_private_file_permissions, load_credentials, required_for, CredentialName, Credentials,
};
use outdial::engine::OrchestrationEngine;
use outdial::history::CallState;
use outdial::providers::twilio::TwilioClient;
use outdial::providers::ultravox::UltravoxClient;
use outdial::providers::TranscriptRole;
use outdial::request::{CallRequestBuilder, OperatorInput};

#[derive(Parser)]
#[command(name = "outdial", version, about = "AI-voiced outbound phone calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the runtime directory layout with a sample template.
    Init,
    /// List loaded call templates.
    Templates,
    /// Report present/missing upstream credentials for a template.
    Check {
        /// Template key; the default template when omitted.
        #[arg(long)]
        template: Option<String>,
    },
    /// Build a call request and place the call.
    Call {
        /// Template key; the default template when omitted.
        #[arg(long)]
        template: Option<String>,
        /// Destination phone number (E.164).
        #[arg(long)]
        to: String,
        /// Customer name override.
        #[arg(long)]
        name: Option<String>,
        /// Customer gender override.
        #[arg(long)]
        gender: Option<String>,
        /// Extra key=value parameter; repeatable.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Wait for the call to end and print the transcript.
        #[arg(long)]
        wait: bool,
        /// Bound on the wait, in seconds.
        #[arg(long, default_value_t = outdial::engine::DEFAULT_WATCH_TIMEOUT.as_secs())]
        wait_secs: u64,
    },
}

/// Parse a `key=value` CLI parameter.
fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value parameter: {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in parameter: {raw:?}"));
    }
    Ok((key.trim().to_owned(), value.to_owned()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = runtime_paths()?;

    match cli.command {
        Command::Init => {
            outdial::logging::init_cli();
            run_init(&paths)
        }
        Command::Templates => {
            outdial::logging::init_cli();
            run_templates(&paths)
        }
        Command::Check { template } => {
            outdial::logging::init_cli();
            run_check(&paths, template.as_deref())
        }
        Command::Call {
            template,
            to,
            name,
            gender,
            params,
            wait,
            wait_secs,
        } => {
            let _guard = outdial::logging::init_production(&paths.logs_dir)?;
            let input = OperatorInput {
                template_key: template,
                destination: to,
                customer_name: name,
                gender,
                params: params.into_iter().collect(),
            };
            run_call(&paths, input, wait, wait_secs).await
        }
    }
}

/// Sample template written by `init`.
const SAMPLE_TEMPLATE: &str = r#"key = "sales-followup"
default = true
prompt = """
You are a polite sales agent calling {{name}}. Confirm their interest in
the product and answer questions briefly. Their phone number on file is
{{phone_number}}.
"""
from_number = "+16416663498"
model = "fixie-ai/ultravox"
temperature = 0.3

[voice]
provider = "built-in"
voice = "Maansvi"

[defaults]
name = "Amit Lodha"
gender = "Male"
"#;

fn run_init(paths: &RuntimePaths) -> Result<()> {
    std::fs::create_dir_all(&paths.templates_dir)
        .with_context(|| format!("failed to create {}", paths.templates_dir.display()))?;
    std::fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;

    let sample_path = paths.templates_dir.join("sales-followup.toml");
    if !sample_path.exists() {
        std::fs::write(&sample_path, SAMPLE_TEMPLATE)
            .with_context(|| format!("failed to write {}", sample_path.display()))?;
        println!("wrote sample template {}", sample_path.display());
    }

    if !paths.env_file.exists() {
        let mut stub = String::new();
        for name in CredentialName::all() {
            stub.push_str(name.env_var());
            stub.push_str("=\n");
        }
        std::fs::write(&paths.env_file, stub)
            .with_context(|| format!("failed to write {}", paths.env_file.display()))?;
        enforce_private_file_permissions(&paths.env_file)?;
        println!("wrote credentials stub {}", paths.env_file.display());
    }

    println!("runtime directory ready at {}", paths.base.display());
    Ok(())
}

fn run_templates(paths: &RuntimePaths) -> Result<()> {
    let store = TemplateStore::load(&paths.templates_dir)
        .with_context(|| format!("failed to load templates from {}", paths.templates_dir.display()))?;
    for template in store.templates() {
        let marker = if template.key == store.default_key() {
            " (default)"
        } else {
            ""
        };
        println!(
            "{}{marker}: model {}, from {}",
            template.key, template.model, template.from_number
        );
    }
    Ok(())
}

fn run_check(paths: &RuntimePaths, template_key: Option<&str>) -> Result<()> {
    let store = TemplateStore::load(&paths.templates_dir)
        .with_context(|| format!("failed to load templates from {}", paths.templates_dir.display()))?;
    let template = match template_key {
        Some(key) => store.get(key)?,
        None => store.default_template(),
    };

    // A missing .env is itself a reportable state here, not a hard error.
    let credentials = load_credentials(&paths.env_file).unwrap_or_default();
    let required = required_for(template);
    let check = credentials.check(&required);

    println!("credentials for template {}:", template.key);
    for name in &check.present {
        println!("  present  {name}");
    }
    for name in &check.missing {
        println!("  MISSING  {name}");
    }
    if credentials.value_of(CredentialName::AiServiceUrl).is_some() {
        println!("  present  {} (optional)", CredentialName::AiServiceUrl);
    }
    if check.is_satisfied() {
        println!("all required credentials are present");
    } else {
        println!("calls with this template cannot be placed until the missing secrets are set");
    }
    Ok(())
}

async fn run_call(
    paths: &RuntimePaths,
    input: OperatorInput,
    wait: bool,
    wait_secs: u64,
) -> Result<()> {
    let store = TemplateStore::load(&paths.templates_dir)
        .with_context(|| format!("failed to load templates from {}", paths.templates_dir.display()))?;
    // Credentials are read fresh per call; the operator may have edited them.
    let credentials = load_credentials(&paths.env_file)?;

    let builder = CallRequestBuilder::new(&store, &credentials);
    let request = builder.build(&input)?;
    info!(template = %request.template_key, destination = %request.destination, "call request built");

    let engine = build_engine(&credentials)?;
    let outcome = engine.place_call(request).await?;

    println!("history entry {}", outcome.entry_id);
    println!("state: {}", outcome.state);
    if let Some(session_id) = &outcome.session_id {
        println!("session: {session_id}");
    }
    if let Some(carrier_call_id) = &outcome.carrier_call_id {
        println!("carrier call: {carrier_call_id}");
    }
    if let Some(error) = &outcome.error {
        println!("error: {error}");
        anyhow::bail!("call attempt failed");
    }

    if wait {
        let watched = engine
            .watch_session(outcome.entry_id, Duration::from_secs(wait_secs))
            .await?;
        if watched.timed_out {
            println!("call still live after {wait_secs}s; giving up on the transcript");
        } else {
            println!("final state: {}", watched.state);
            print_entry_summary(&engine, outcome.entry_id);
        }
    }

    Ok(())
}

fn print_entry_summary(engine: &OrchestrationEngine, entry_id: uuid::Uuid) {
    let Some(entry) = engine.history().get(entry_id) else {
        return;
    };
    if let Some(reason) = &entry.end_reason {
        println!("end reason: {reason}");
    }
    if entry.state == CallState::Failed {
        if let Some(detail) = &entry.error_detail {
            println!("failure detail: {detail}");
        }
    }
    if let Some(transcript) = &entry.transcript {
        println!("transcript:");
        for line in transcript {
            let speaker = match line.role {
                TranscriptRole::Agent => "agent",
                TranscriptRole::Customer => "customer",
            };
            println!("  [{speaker}] {}", line.text);
        }
    }
}

fn build_engine(credentials: &Credentials) -> Result<OrchestrationEngine> {
    let api_key = credentials
        .value_of(CredentialName::AiServiceKey)
        .context("ULTRAVOX_API_KEY missing after pre-flight check")?
        .to_owned();
    let sessions = match credentials.value_of(CredentialName::AiServiceUrl) {
        Some(url) => UltravoxClient::with_base_url(api_key, url.to_owned()),
        None => UltravoxClient::new(api_key),
    };

    let account_sid = credentials
        .value_of(CredentialName::CarrierAccountId)
        .context("TWILIO_ACCOUNT_SID missing after pre-flight check")?
        .to_owned();
    let auth_token = credentials
        .value_of(CredentialName::CarrierAuthToken)
        .context("TWILIO_AUTH_TOKEN missing after pre-flight check")?
        .to_owned();
    let carrier = TwilioClient::new(account_sid, auth_token);

    Ok(OrchestrationEngine::new(
        Arc::new(sessions),
        Arc::new(carrier),
        Arc::new(outdial::history::CallHistoryStore::new()),
    ))
}
