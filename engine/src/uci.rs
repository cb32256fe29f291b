use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};

use crate::{EngineSearch, Score};

/// An external engine driven over the UCI protocol. The process is shut down on drop.
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciEngine {
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start engine at {:?}", path))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Engine stdout unavailable"))?;

        let mut engine = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        engine.send("uci")?;
        engine.read_until("uciok")?;
        engine.ready()?;

        Ok(engine)
    }

    fn ready(&mut self) -> Result<()> {
        self.send("isready")?;
        self.read_until("readyok")?;
        Ok(())
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        debug!("> {}", cmd);
        writeln!(self.stdin, "{}", cmd)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            bail!("Engine closed its output");
        }

        Ok(line.trim_end().to_string())
    }

    fn read_until(&mut self, token: &str) -> Result<()> {
        loop {
            let line = self.read_line()?;
            if line.split_whitespace().next() == Some(token) {
                return Ok(());
            }
        }
    }
}

impl EngineSearch for UciEngine {
    fn search(&mut self, fen: &str, movetime_ms: u64) -> Result<(String, Score)> {
        self.ready()?;
        self.send(&format!("position fen {}", fen))?;
        self.send(&format!("go movetime {}", movetime_ms))?;

        let mut score = None;
        loop {
            let line = self.read_line()?;
            if let Some(info_score) = parse_info_score(&line) {
                score = Some(info_score);
            } else if let Some(best_move) = parse_best_move(&line) {
                let score =
                    score.ok_or_else(|| anyhow!("Engine returned no score for {}", fen))?;
                return Ok((best_move, score));
            }
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        if self.send("quit").is_err() {
            debug!("Engine already closed");
        }

        if !matches!(self.child.try_wait(), Ok(Some(_))) {
            if let Err(err) = self.child.kill() {
                warn!("Failed to stop engine process: {}", err);
            }
        }

        let _ = self.child.wait();
    }
}

fn parse_info_score(line: &str) -> Option<Score> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("info") {
        return None;
    }

    while let Some(token) = tokens.next() {
        if token == "score" {
            return match (tokens.next(), tokens.next().and_then(|v| v.parse().ok())) {
                (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                (Some("mate"), Some(mate)) => Some(Score::Mate(mate)),
                _ => None,
            };
        }
    }

    None
}

fn parse_best_move(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some("bestmove"), Some(best_move)) => Some(best_move.to_string()),
        _ => None,
    }
}
