use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;

use mailsweep::cli::{self, Command, USAGE};
use mailsweep::config::{ClassifierConfig, SweepConfig};
use mailsweep::error::{ConfigError, Error};
use mailsweep::pipeline::classifier::Classifier;
use mailsweep::pipeline::processor::SweepProcessor;
use mailsweep::pipeline::rules::{MatchMode, RuleSet, RulesEngine, SearchResult};
use mailsweep::pipeline::types::Message;
use mailsweep::server::sweep_routes;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only results.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let command = match cli::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode, Error> {
    let sweep_config = SweepConfig::from_env();

    match command {
        Command::Help => {
            println!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }

        Command::Classify {
            sender,
            subject,
            body,
        } => {
            let classifier = Classifier::new(&ClassifierConfig::from_env()?)?;
            let classification = classifier.classify(&sender, &subject, &body).await;
            println!("{}", classification.decision);
            if let Some(issue) = &classification.issue {
                eprintln!("Warning: {issue}");
            }
            Ok(ExitCode::from(cli::classify_exit_code(&classification)))
        }

        Command::CheckRules { rules } => {
            let rule_set = RuleSet::load(&rules)?;
            RulesEngine::new(rule_set.clone()).compile()?;
            println!("{}", rule_set.to_toml_string()?);
            eprintln!("{} rule(s) OK", rule_set.rules.len());
            Ok(ExitCode::SUCCESS)
        }

        Command::Evaluate {
            rules,
            messages,
            all_matches,
            classify,
        } => {
            let mut rule_set = RuleSet::load(&rules)?;
            if all_matches {
                rule_set.match_mode = MatchMode::AllMatches;
            }
            let messages: Vec<Message> = read_json(&messages)?;

            let classifier = if classify {
                Some(Arc::new(Classifier::new(&ClassifierConfig::from_env()?)?))
            } else {
                None
            };
            let processor = SweepProcessor::new(
                RulesEngine::new(rule_set),
                classifier,
                sweep_config.review_label,
            );

            let report = processor.process_batch(&messages, Utc::now()).await?;
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Resolve { rules, results } => {
            let engine = RulesEngine::new(RuleSet::load(&rules)?);
            let results: Vec<SearchResult> = read_json(&results)?;
            let decisions = engine.resolve_search_results(&results)?;
            print_json(&decisions)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Serve { rules, bind } => {
            let rule_set = match rules {
                Some(path) => RuleSet::load(&path)?,
                None => RuleSet::default(),
            };
            let engine = RulesEngine::new(rule_set);
            engine.compile()?;

            let classifier = Arc::new(Classifier::new(&ClassifierConfig::from_env()?)?);
            let processor = Arc::new(SweepProcessor::new(
                engine,
                Some(Arc::clone(&classifier)),
                sweep_config.review_label,
            ));
            let app = sweep_routes(classifier, processor);

            let bind = bind.unwrap_or(sweep_config.bind);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .map_err(ConfigError::Io)?;
            tracing::info!(bind = %bind, "mailsweep server started");
            axum::serve(listener, app).await.map_err(ConfigError::Io)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ConfigError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    println!("{json}");
    Ok(())
}
