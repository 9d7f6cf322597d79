use std::io::{BufRead, Write};

/// Yes/no decisions the install run may need from the user.
pub trait Prompt {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on stdin; anything but `y`/`yes` means no.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, question: &str) -> bool {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{question} [y/N] ");
        let _ = stdout.flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_affirmative(&answer)
    }
}

/// Fixed answer for unattended runs (`--yes`) and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoAnswer(pub bool);

impl Prompt for AutoAnswer {
    fn confirm(&self, question: &str) -> bool {
        log::info!("{question} -> {}", if self.0 { "yes" } else { "no" });
        self.0
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::{AutoAnswer, Prompt, is_affirmative};

    #[test]
    fn only_yes_answers_confirm() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES \r\n"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn auto_answer_returns_its_value() {
        assert!(AutoAnswer(true).confirm("Continue?"));
        assert!(!AutoAnswer(false).confirm("Continue?"));
    }
}
