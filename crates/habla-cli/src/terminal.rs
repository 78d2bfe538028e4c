//! Terminal front-end for the sentence game.
//!
//! Lines typed by the learner are either commands (starting with `:`) or a
//! sentence to submit.

use chrono::{DateTime, Utc};
use habla_game::{verdict, GameSession, Phase};

/// What the learner asked for with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Submit this text as the transcript.
    Say(String),
    /// Submit the transcript as it stands, e.g. after speaking.
    Submit,
    /// Move on to the next word.
    Next,
    /// Toggle the microphone.
    Listen,
    /// Show an example sentence for the current word.
    Context,
    /// Show the command list.
    Help,
    /// Leave the game.
    Quit,
    /// A `:` command that does not exist.
    Unknown(String),
}

/// Parses one input line.
///
/// An empty line means "next" once a result is shown.
pub fn parse_command(line: &str, phase: Phase) -> Command {
    let line = line.trim();
    match line {
        ":next" | ":n" => Command::Next,
        "" if phase == Phase::Result => Command::Next,
        ":listen" | ":l" => Command::Listen,
        ":submit" | ":s" => Command::Submit,
        ":context" | ":c" => Command::Context,
        ":help" | ":h" | ":?" => Command::Help,
        ":quit" | ":q" | ":exit" => Command::Quit,
        other if other.starts_with(':') => Command::Unknown(other.to_string()),
        other => Command::Say(other.to_string()),
    }
}

/// Help text for the game commands.
pub const HELP: &str = "\
Type a Spanish sentence and press Enter to check it.
  :listen   toggle the microphone
  :submit   check what the microphone heard
  :context  show an example sentence for the word
  :next     next word (or press Enter on a result)
  :quit     leave the game";

/// Renders the challenge prompt block.
pub fn render_prompt(session: &GameSession) -> String {
    let word = session.current_word();
    let position = format!("[{}/{}]", session.index() + 1, session.list().len());

    match session.phase() {
        Phase::AnsweringFollowup | Phase::ValidatingAnswer => {
            format!("{position} Question: {}", session.prompt())
        }
        _ => format!(
            "{position} Use the word: {} ({})",
            session.prompt(),
            word.source_text()
        ),
    }
}

/// Renders what the recognizer has heard so far.
pub fn render_transcript(session: &GameSession) -> String {
    format!("  heard: {}", session.transcript())
}

/// Renders the closing line of a game.
pub fn render_summary(session: &GameSession, now: DateTime<Utc>) -> String {
    let elapsed = (now - session.started_at()).num_seconds().max(0);
    let words = session.challenge();
    format!(
        "Practiced {words} word{} in {}m {:02}s",
        if words == 1 { "" } else { "s" },
        elapsed / 60,
        elapsed % 60
    )
}

/// Renders the feedback shown in the result phase.
pub fn render_result(session: &GameSession) -> String {
    let mut lines = Vec::new();

    if let Some(feedback) = session.sentence_feedback() {
        lines.push(verdict(feedback.valid).to_string());
        if !feedback.reason.is_empty() {
            lines.push(format!("  {}", feedback.reason));
        }
    }

    if let Some(answer) = session.answer_feedback() {
        if let Some(question) = session.follow_up_question() {
            lines.push(format!("Question: {question}"));
        }
        lines.push(format!("Answer: {}", verdict(answer.valid)));
        if !answer.feedback.is_empty() {
            lines.push(format!("  {}", answer.feedback));
        }
    }

    lines.push("Press Enter for the next word.".to_string());
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use habla_api::{AnswerFeedback, SentenceFeedback, VocabularyList, WordPair};
    use habla_game::{GameEvent, RecognitionEvent};

    use super::*;

    fn session() -> GameSession {
        let list = VocabularyList::new(
            "1",
            "Animals",
            vec![WordPair::new("dog", "perro"), WordPair::new("cat", "gato")],
        );
        GameSession::new(Arc::new(list)).unwrap()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(":next", Phase::Result), Command::Next);
        assert_eq!(parse_command("", Phase::Result), Command::Next);
        assert_eq!(parse_command("", Phase::Playing), Command::Say(String::new()));
        assert_eq!(parse_command(" :q ", Phase::Playing), Command::Quit);
        assert_eq!(parse_command(":submit", Phase::AnsweringFollowup), Command::Submit);
        assert_eq!(parse_command(":s", Phase::Playing), Command::Submit);
        assert_eq!(
            parse_command("El perro corre.", Phase::Playing),
            Command::Say("El perro corre.".to_string())
        );
        assert_eq!(
            parse_command(":dance", Phase::Playing),
            Command::Unknown(":dance".to_string())
        );
    }

    #[test]
    fn test_render_prompt_shows_word() {
        assert_eq!(render_prompt(&session()), "[1/2] Use the word: perro (dog)");
    }

    #[test]
    fn test_render_summary() {
        let mut s = session();
        s.handle(GameEvent::Submit).unwrap();
        s.handle(GameEvent::SentenceCheckFailed { challenge: 0 })
            .unwrap();
        s.handle(GameEvent::NextWord).unwrap();

        let later = s.started_at() + chrono::Duration::seconds(125);
        assert_eq!(render_summary(&s, later), "Practiced 1 word in 2m 05s");
        assert_eq!(
            render_summary(&session(), Utc::now()),
            "Practiced 0 words in 0m 00s"
        );
    }

    #[test]
    fn test_render_transcript() {
        let mut s = session();
        s.handle(GameEvent::StartCapture).unwrap();
        s.handle(GameEvent::Recognition(RecognitionEvent::Interim(
            "El perro".to_string(),
        )))
        .unwrap();
        assert_eq!(render_transcript(&s), "  heard: El perro");
    }

    #[test]
    fn test_render_result_with_answer() {
        let mut s = session();
        s.handle(GameEvent::Submit).unwrap();
        s.handle(GameEvent::SentenceChecked {
            challenge: 0,
            feedback: SentenceFeedback::new(true, "ok").with_follow_up("¿De qué color es?"),
        })
        .unwrap();
        assert_eq!(render_prompt(&s), "[1/2] Question: ¿De qué color es?");

        s.handle(GameEvent::Submit).unwrap();
        s.handle(GameEvent::AnswerChecked {
            challenge: 0,
            feedback: AnswerFeedback::new(false, "Wrong color."),
        })
        .unwrap();

        assert_eq!(
            render_result(&s),
            "Correct!\n  ok\nQuestion: ¿De qué color es?\nAnswer: Incorrect\n  Wrong color.\nPress Enter for the next word."
        );
    }
}
