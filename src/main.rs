// src/main.rs

use colored::Colorize;
use log::warn;
use parley::api::ApiClient;
use parley::cache::ChatCache;
use parley::characters::fetch_characters;
use parley::chats::{load_chat, store_chat};
use parley::completion::generate_stream;
use parley::config::{get_config, initialize_config, Config};
use parley::errors::{ParleyError, ParleyResult};
use parley::logging::init_logging;
use parley::models::{
    transcript_to_history, Character, ChatKey, ChatMessage, CompletionRequest, MessageExtra,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> ParleyResult<()> {
    initialize_config()?;
    let config = get_config();
    let _logger = init_logging(&config.log_level)?;

    let api = ApiClient::new(&config.base_url)?;
    let cache = ChatCache::open(&config.db_path).await;
    if !cache.is_enabled() {
        warn!("local chat mirror unavailable; transcripts will only live on the server");
    }

    let characters = fetch_characters(&api).await?;
    if characters.is_empty() {
        println!("The server has no characters yet.");
        return Ok(());
    }

    let mut rl = DefaultEditor::new()
        .map_err(|e| ParleyError::config_error(format!("could not start line editor: {}", e)))?;

    let character = pick_character(&mut rl, &characters)?;
    let key = chat_key_for(character);
    println!(
        "Chatting with {} ({}). /quit to leave.",
        character.name.green().bold(),
        key.file_name
    );

    let mut transcript = match load_chat(&api, &cache, &key).await {
        Ok(transcript) => transcript,
        Err(e) => {
            warn!("could not load prior transcript for {:?}: {}", key, e);
            Vec::new()
        }
    };
    if transcript.is_empty() {
        if let Some(first_mes) = character.first_mes.as_deref().filter(|m| !m.is_empty()) {
            println!("{} {}", prompt_for(&character.name), first_mes);
            transcript.push(ChatMessage::from_character(&character.name, first_mes));
        }
    } else {
        for message in &transcript {
            let name = message.name.as_deref().unwrap_or("?");
            println!("{} {}", prompt_for(name), message.mes);
        }
    }

    loop {
        let line = match rl.readline(&format!("{} ", "you>".cyan().bold())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                return Err(ParleyError::config_error(format!("input failed: {}", e)));
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        let _ = rl.add_history_entry(line);

        transcript.push(ChatMessage::from_user(&config.username, line));

        match stream_reply(&api, &config, &character, &transcript).await {
            Ok(Some(reply)) => {
                transcript.push(reply);
                if store_chat(&api, &cache, &key, Some(&character.avatar), &transcript)
                    .await
                    .is_err()
                {
                    eprintln!(
                        "{}",
                        "warning: server rejected the save; transcript kept locally".yellow()
                    );
                }
            }
            Ok(None) => {
                // Nothing came back; drop the user turn so the transcript
                // stays aligned with what the character actually saw.
                transcript.pop();
            }
            Err(e) => {
                transcript.pop();
                eprintln!("{} {}", "error:".red().bold(), e);
            }
        }
    }

    println!("bye");
    Ok(())
}

fn pick_character<'a>(
    rl: &mut DefaultEditor,
    characters: &'a [Character],
) -> ParleyResult<&'a Character> {
    println!("{}", "Characters:".bold());
    for (i, character) in characters.iter().enumerate() {
        println!("  {}. {}", i + 1, character.name);
    }

    loop {
        let line = rl
            .readline(&format!("{} ", "pick>".cyan().bold()))
            .map_err(|e| ParleyError::config_error(format!("input failed: {}", e)))?;
        match line.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= characters.len() => return Ok(&characters[n - 1]),
            _ => println!("Enter a number between 1 and {}.", characters.len()),
        }
    }
}

fn chat_key_for(character: &Character) -> ChatKey {
    let file_name = character
        .chat
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| {
            format!(
                "{} - {}",
                character.name,
                chrono::Utc::now().format("%Y-%m-%d")
            )
        });
    ChatKey::new(&character.name, file_name)
}

fn prompt_for(name: &str) -> String {
    format!("{}>", name).green().bold().to_string()
}

/// Runs one streamed generation turn, echoing the reply as it arrives.
/// Ctrl-C cancels the stream; whatever was already printed is kept as the
/// reply. Returns `None` when the turn produced no text at all.
async fn stream_reply(
    api: &ApiClient,
    config: &Config,
    character: &Character,
    transcript: &[ChatMessage],
) -> ParleyResult<Option<ChatMessage>> {
    let request = CompletionRequest {
        messages: transcript_to_history(transcript),
        stream: true,
        model: Some(config.model.clone()).filter(|m| !m.is_empty()),
        chat_completion_source: Some(config.chat_completion_source.clone())
            .filter(|s| !s.is_empty()),
        max_tokens: Some(config.max_tokens),
        temperature: Some(f64::from(config.temperature)),
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    print!("{} ", prompt_for(&character.name));
    io::stdout().flush()?;

    let mut printed = 0usize;
    let result = generate_stream(api, &request, Some(&cancel), |chunk| {
        print!("{}", &chunk.text[printed..]);
        let _ = io::stdout().flush();
        printed = chunk.text.len();
    })
    .await;
    watcher.abort();
    println!();

    let output = result?;
    if cancel.is_cancelled() {
        println!("{}", "(cancelled)".yellow());
    }
    if output.content.is_empty() {
        return Ok(None);
    }

    let mut reply = ChatMessage::from_character(&character.name, output.content);
    if output.reasoning.is_some() {
        reply.extra = Some(MessageExtra {
            reasoning: output.reasoning,
            ..Default::default()
        });
    }
    Ok(Some(reply))
}
