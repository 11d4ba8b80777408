// In src/bin/queue_lab.rs
use dmxp_resq::MPMC::builder::INITIAL_QUEUE_SIZE;
use dmxp_resq::{Discipline, Session};
use std::env;
use std::error::Error;
use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Command {
    SpawnProducer,
    SpawnConsumer,
    RetireProducer,
    RetireConsumer,
    Grow,
    Shrink,
    Status,
    Quit,
}

impl Command {
    fn parse(c: char) -> Option<Self> {
        match c {
            'p' => Some(Command::SpawnProducer),
            'c' => Some(Command::SpawnConsumer),
            'P' => Some(Command::RetireProducer),
            'C' => Some(Command::RetireConsumer),
            '+' => Some(Command::Grow),
            '-' => Some(Command::Shrink),
            's' => Some(Command::Status),
            'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

fn print_help(session: &Session) {
    println!("Discipline: {}", session.discipline());
    println!("Commands (press Enter after each):");
    println!("  p - add producer       P - remove producer");
    println!("  c - add consumer       C - remove consumer");
    println!(
        "  + - grow queue by {}    - - shrink queue by {}",
        session.config().resize_step,
        session.config().resize_step
    );
    println!("  s - show status        q - quit");
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let discipline = match args.get(1) {
        Some(arg) => arg.parse::<Discipline>()?,
        None => Discipline::default(),
    };
    let capacity = match args.get(2) {
        Some(arg) => arg.parse::<usize>()?,
        None => INITIAL_QUEUE_SIZE,
    };

    let session = Session::builder()
        .with_discipline(discipline)
        .with_capacity(capacity)
        .build()?;

    let (tx, rx) = mpsc::channel::<Command>();

    // Handle Ctrl+C the same way as 'q'
    let tx_signal = tx.clone();
    ctrlc::set_handler(move || {
        let _ = tx_signal.send(Command::Quit);
    })?;

    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                for command in line.chars().filter_map(Command::parse) {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(Command::Quit);
        })?;

    print_help(&session);

    // A closed channel means both input sources are gone
    while let Ok(command) = rx.recv() {
        let outcome = match command {
            Command::SpawnProducer => session.spawn_producer().map(|_| ()).map_err(|e| e.to_string()),
            Command::SpawnConsumer => session.spawn_consumer().map(|_| ()).map_err(|e| e.to_string()),
            Command::RetireProducer => session.retire_producer().map(|_| ()).map_err(|e| e.to_string()),
            Command::RetireConsumer => session.retire_consumer().map(|_| ()).map_err(|e| e.to_string()),
            Command::Grow => session.grow().map(|_| ()).map_err(|e| e.to_string()),
            Command::Shrink => session.shrink().map(|_| ()).map_err(|e| e.to_string()),
            Command::Status => {
                println!("{}", session.status());
                Ok(())
            }
            Command::Quit => break,
        };
        if let Err(e) = outcome {
            eprintln!("{e}");
        }
    }

    println!("Shutting down...");
    let summary = session.shutdown();
    println!("Total messages added:     {}", summary.total_enqueued);
    println!("Total messages extracted: {}", summary.total_dequeued);
    println!("Messages destroyed:       {}", summary.destroyed);
    for report in &summary.workers {
        println!(
            "  {}-{}: {} messages, {} integrity failures",
            report.role, report.id, report.processed, report.integrity_failures
        );
    }
    Ok(())
}
