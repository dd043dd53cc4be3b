//! Interactive chat loop over the session runtime.

use std::io::Write as _;

use brujula_runtime::{SessionRuntime, TurnHandle};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(runtime: SessionRuntime) -> anyhow::Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    println!("{}", "Brújula — asistente de políticas internas".bold());
    println!("Escribe tu pregunta, un número para usar una pregunta inicial,");
    println!("'?' para la pregunta sugerida o 'salir' para terminar.\n");

    let starters = runtime.starter_questions().to_vec();
    for (i, starter) in starters.iter().enumerate() {
        println!(
            "  {} {} — {}",
            format!("{}.", i + 1).bold(),
            starter.label.cyan(),
            starter.message
        );
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("salir") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        let handle = if input == "?" {
            match runtime.select_suggested_question(&session_id).await {
                Some(handle) => handle,
                None => {
                    println!("{}", "No hay pregunta sugerida pendiente.".yellow());
                    continue;
                }
            }
        } else if let Some(starter) = input
            .parse::<usize>()
            .ok()
            .and_then(|n| starters.get(n.checked_sub(1)?))
        {
            println!("{} {}", ">".dimmed(), starter.message);
            runtime.submit(&session_id, starter.message.clone())
        } else {
            runtime.submit(&session_id, input)
        };

        run_turn(handle).await?;
    }

    println!("Hasta pronto.");
    Ok(())
}

async fn run_turn(mut handle: TurnHandle) -> anyhow::Result<()> {
    while let Some(token) = handle.next_token().await {
        print!("{token}");
        std::io::stdout().flush()?;
    }
    println!();

    let outcome = handle.outcome().await;

    if let Some(error) = outcome.error {
        println!("{} {}", "Error interno:".red().bold(), error);
        return Ok(());
    }

    if !outcome.used_docs.is_empty() {
        println!("\n{}", "Documentos consultados:".bold());
        for doc in &outcome.used_docs {
            println!("  - {} ({})", doc.name.cyan(), doc.source.dimmed());
        }
    }

    if let Some(question) = outcome.suggested_question {
        println!(
            "\n{} {}  {}",
            "Pregunta sugerida:".bold(),
            question,
            "(escribe '?' para usarla)".dimmed()
        );
    }
    println!();

    Ok(())
}
