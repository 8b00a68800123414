//! Line-oriented session loop with autosave and idle logout.

use anyhow::Result;
use keeper_core::{Field, Keeper, PlainRecord, SaveOutcome};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
commands:
  list                              show records
  add <site> <username> <password>  add a record
  edit <id> <site> <username> <password>
  rm <id>                           delete a record
  search <query>                    search all fields
  save                              write changes now
  clear                             delete every record
  quit                              save and exit
  discard                           exit without saving";

const IDLE_POLL: Duration = Duration::from_secs(1);

pub async fn run(keeper: Keeper) -> Result<()> {
    if keeper.start_autosave() {
        info!("autosave enabled");
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut idle = tokio::time::interval(IDLE_POLL);

    let save_on_exit = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break true,
                    // unreadable input still logs out through close
                    Err(err) => {
                        warn!(error = %err, "stdin read failed, logging out");
                        break true;
                    }
                };
                match handle(&keeper, line.trim()) {
                    Ok(Step::Continue) => {}
                    Ok(Step::Exit { save }) => break save,
                    Err(err) => println!("error: {err}"),
                }
            }
            _ = idle.tick() => {
                if keeper.is_idle_expired() {
                    println!("Idle timeout reached, logging out.");
                    break true;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break true;
            }
        }
    };

    let closing = keeper.clone();
    let outcome = tokio::task::spawn_blocking(move || closing.close(save_on_exit)).await??;
    match outcome {
        SaveOutcome::Saved { rows } => println!("Saved {rows} records."),
        SaveOutcome::Discarded => println!("Changes discarded."),
        other => warn!(?other, "unexpected close outcome"),
    }
    Ok(())
}

enum Step {
    Continue,
    Exit { save: bool },
}

fn handle(keeper: &Keeper, line: &str) -> Result<Step> {
    keeper.touch();
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Step::Continue);
    };
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("list", []) => {
            let limit = keeper.settings().display.records_shown;
            keeper.with_records(|r| print_records(r.iter().take(limit)));
        }
        ("add", [site, username, password]) => {
            let id = keeper.with_records_mut(|r| r.add(site, username, password))?;
            println!("Record {id} added.");
        }
        ("edit", [id, site, username, password]) => {
            let id: u32 = id.parse()?;
            keeper.with_records_mut(|r| r.update(id, site, username, password))?;
            println!("Record {id} updated.");
        }
        ("rm", [id]) => {
            let id: u32 = id.parse()?;
            keeper.with_records_mut(|r| r.remove(id))?;
            println!("Record {id} deleted.");
        }
        ("search", [query]) => {
            keeper.with_records(|r| print_records(r.search(query, &Field::ALL).into_iter()));
        }
        ("save", []) => match keeper.save()? {
            SaveOutcome::Saved { rows } => println!("Saved {rows} records."),
            _ => println!("Nothing to save."),
        },
        ("clear", []) => {
            keeper.clear_all()?;
            println!("All records deleted.");
        }
        ("quit", []) => return Ok(Step::Exit { save: true }),
        ("discard", []) => return Ok(Step::Exit { save: false }),
        _ => println!("{HELP}"),
    }
    Ok(Step::Continue)
}

fn print_records<'a>(records: impl Iterator<Item = &'a PlainRecord>) {
    let mut shown = 0;
    for r in records {
        println!("{:>4}  {:<24} {:<32} {}", r.id, r.site, r.username, r.password);
        shown += 1;
    }
    if shown == 0 {
        println!("(no records)");
    }
}
