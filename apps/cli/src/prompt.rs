//! Terminal reviewer for `leadgen run --interactive`.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use leadgen_core::review::{ReviewDecision, Reviewer, Verdict};
use leadgen_shared::{Lead, LeadGenError, Result};

/// Asks for a verdict on each lead over stdin. Prompts go to stderr.
pub(crate) struct TerminalReviewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Decide(Verdict),
    Skip,
    Quit,
}

/// `a`/`approve`/`y`, `r`/`reject`/`n`, `q`/`quit`; anything else skips.
/// Text after the first word becomes the review note.
fn parse_answer(line: &str) -> (Answer, String) {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let answer = match word.to_ascii_lowercase().as_str() {
        "a" | "approve" | "y" | "yes" => Answer::Decide(Verdict::Approve),
        "r" | "reject" | "n" | "no" => Answer::Decide(Verdict::Reject),
        "q" | "quit" => Answer::Quit,
        _ => Answer::Skip,
    };
    (answer, rest.trim().to_string())
}

fn describe(lead: &Lead) -> String {
    let p = &lead.property;
    let price = p.price.map(|v| format!("${v:.0}")).unwrap_or_else(|| "price n/a".into());
    let mut lines = vec![format!(
        "{}, {}, {} | {} | {}",
        p.address, p.city, p.state, p.property_type, price
    )];
    let contact = [lead.owner_name.as_deref(), lead.owner_phone.as_deref(), lead.owner_email.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" / ");
    if !contact.is_empty() {
        lines.push(format!("owner: {contact}"));
    }
    if !p.motivation_signals.is_empty() {
        lines.push(format!("signals: {}", p.motivation_signals.join(", ")));
    }
    lines.join("\n      ")
}

#[async_trait]
impl Reviewer for TerminalReviewer {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn review(&self, leads: &[Lead]) -> Result<Vec<ReviewDecision>> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut decisions = Vec::new();

        eprintln!();
        eprintln!("Review {} lead(s): [a]pprove, [r]eject, [s]kip, [q]uit, optionally followed by a note", leads.len());
        for (i, lead) in leads.iter().enumerate() {
            eprintln!();
            eprintln!("[{}/{}] score {:.1}", i + 1, leads.len(), lead.score_or_zero());
            eprintln!("      {}", describe(lead));
            eprint!("> ");
            let _ = std::io::stderr().flush();

            let line = input
                .next_line()
                .await
                .map_err(|e| LeadGenError::Review(format!("failed to read answer: {e}")))?;
            let Some(line) = line else {
                break;
            };
            match parse_answer(&line) {
                (Answer::Decide(verdict), notes) => {
                    decisions.push(ReviewDecision::new(lead.id.to_string(), verdict).with_notes(notes));
                }
                (Answer::Skip, _) => {}
                (Answer::Quit, _) => break,
            }
        }
        Ok(decisions)
    }
}
