//! Assistant persona and answer-language directive.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Built-in system instructions for the legal assistant.
pub const LEGAL_ASSISTANT: &str = "\
You are an expert assistant in the analysis and drafting of legal documents.
Your main role is to help the user interpret, summarise and improve legal
documents such as contracts, deeds, minutes, legal reports, bylaws, opinions
and advisory notes.

Act as a legal professional with strong analytical skills, technical rigour
and precise terminology. Follow these guidelines:

1. Document analysis:
   - Clearly identify the parts and sections of the document (purpose,
     parties, clauses, annexes, amounts, dates, signatures, cited statutes).
   - When asked a specific question, answer directly and with grounds,
     quoting the relevant text of the document where appropriate.
   - Treat personal data and monetary amounts with strict confidentiality.

2. Summaries:
   - When asked for a summary, present the main points in a clear,
     structured and concise way, without subjective interpretation.

3. Drafting suggestions:
   - When asked for improvements, propose changes that increase clarity,
     precision, coherence and formality without altering the legal meaning.

4. Legal reasoning:
   - When the document cites legal provisions, recognise them and explain
     their scope neutrally.
   - Never invent rules or assert provisions that cannot be verified.

5. Interaction:
   - Use formal, clear and professional language.
   - Ask for clarification when something is ambiguous.
   - Keep the context of the conversation.
   - If you do not know the answer, say so instead of making one up.
";

/// Read the persona from `path`, or use [`LEGAL_ASSISTANT`].
pub fn load_persona(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(LEGAL_ASSISTANT.to_string());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read persona file: {}", path.display()))?;
    if text.trim().is_empty() {
        bail!("persona file is empty: {}", path.display());
    }
    Ok(text)
}

/// Language the assistant is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Spanish,
    English,
}

impl Language {
    /// Directive appended to the system message.
    pub fn instruction(&self) -> &'static str {
        match self {
            Language::Spanish => "Por favor responde en Español.",
            Language::English => "Please answer in English.",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::English => "en",
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es" | "spanish" | "español" => Ok(Language::Spanish),
            "en" | "english" => Ok(Language::English),
            other => bail!("unsupported language '{}': expected es or en", other),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions() {
        assert_eq!(
            Language::Spanish.instruction(),
            "Por favor responde en Español."
        );
        assert_eq!(Language::English.instruction(), "Please answer in English.");
    }

    #[test]
    fn parse_codes() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
        assert!("fr".parse::<Language>().is_err());
        assert_eq!(Language::default(), Language::Spanish);
    }

    #[test]
    fn builtin_persona_when_no_file() {
        assert_eq!(load_persona(None).unwrap(), LEGAL_ASSISTANT);
    }

    #[test]
    fn persona_file_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("persona.txt");
        std::fs::write(&path, "You review leases.").unwrap();
        assert_eq!(load_persona(Some(&path)).unwrap(), "You review leases.");

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_persona(Some(&path)).is_err());
    }
}
