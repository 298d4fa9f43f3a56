//! Command-line speech synthesis
//!
//! Speaks through whichever platform TTS command is installed:
//! `espeak-ng` or `espeak` on Linux, `say` on macOS, and the
//! `System.Speech` assembly through PowerShell on Windows.

use crate::alert::{AlertError, SpeechSynthesizer};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Which TTS command line to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    EspeakNg,
    Espeak,
    Say,
    PowerShell,
}

impl SpeechBackend {
    /// Candidates in lookup order, per platform
    pub fn candidates() -> &'static [(SpeechBackend, &'static str)] {
        if cfg!(target_os = "macos") {
            &[(SpeechBackend::Say, "say")]
        } else if cfg!(target_os = "windows") {
            &[
                (SpeechBackend::PowerShell, "powershell"),
                (SpeechBackend::PowerShell, "pwsh"),
            ]
        } else {
            &[
                (SpeechBackend::EspeakNg, "espeak-ng"),
                (SpeechBackend::Espeak, "espeak"),
            ]
        }
    }

    /// Build the argument list for speaking `text` at `rate` words per minute
    pub fn args(&self, text: &str, rate: u32) -> Vec<String> {
        match self {
            SpeechBackend::EspeakNg | SpeechBackend::Espeak => {
                vec!["-s".to_string(), rate.to_string(), text.to_string()]
            }
            SpeechBackend::Say => vec!["-r".to_string(), rate.to_string(), text.to_string()],
            SpeechBackend::PowerShell => {
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {}; $s.Speak('{}')",
                    powershell_rate(rate),
                    text.replace('\'', "''")
                );
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    script,
                ]
            }
        }
    }
}

/// Map words per minute onto System.Speech's -10..=10 scale (0 is ~150 wpm)
fn powershell_rate(rate: u32) -> i32 {
    ((rate as i32 - 150) / 15).clamp(-10, 10)
}

/// Speech synthesizer backed by an external TTS command
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: PathBuf,
    backend: SpeechBackend,
    rate: u32,
}

impl CommandSpeech {
    pub fn new(program: impl Into<PathBuf>, backend: SpeechBackend, rate: u32) -> Self {
        Self {
            program: program.into(),
            backend,
            rate,
        }
    }

    /// Find an installed TTS command on `PATH`
    pub fn detect(rate: u32) -> Result<Self, AlertError> {
        Self::detect_with(rate, |name| which::which(name).ok())
    }

    /// Find a TTS command using a custom resolver
    pub fn detect_with<F>(rate: u32, resolve: F) -> Result<Self, AlertError>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        for &(backend, name) in SpeechBackend::candidates() {
            if let Some(program) = resolve(name) {
                info!("Using {:?} speech via {}", backend, program.display());
                return Ok(Self::new(program, backend, rate));
            }
        }

        let names: Vec<&str> = SpeechBackend::candidates().iter().map(|(_, n)| *n).collect();
        Err(AlertError::SpeechUnavailable(format!(
            "none of [{}] found on PATH",
            names.join(", ")
        )))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn backend(&self) -> SpeechBackend {
        self.backend
    }
}

impl SpeechSynthesizer for CommandSpeech {
    fn speak(&mut self, text: &str) -> Result<(), AlertError> {
        let args = self.backend.args(text, self.rate);
        debug!("Speaking via {} {:?}", self.program.display(), args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| AlertError::SpeechFailed(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AlertError::SpeechFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_espeak_args() {
        let args = SpeechBackend::EspeakNg.args("Please take a break.", 150);
        assert_eq!(args, vec!["-s", "150", "Please take a break."]);
    }

    #[test]
    fn test_say_args() {
        let args = SpeechBackend::Say.args("hello", 180);
        assert_eq!(args, vec!["-r", "180", "hello"]);
    }

    #[test]
    fn test_powershell_args_escape_quotes() {
        let args = SpeechBackend::PowerShell.args("It's time", 150);
        assert_eq!(args.len(), 4);
        assert_eq!(args[2], "-Command");
        assert!(args[3].contains("$s.Rate = 0;"));
        assert!(args[3].contains("$s.Speak('It''s time')"));
    }

    #[test]
    fn test_powershell_rate_is_clamped() {
        assert_eq!(powershell_rate(150), 0);
        assert_eq!(powershell_rate(300), 10);
        assert_eq!(powershell_rate(1_000), 10);
        assert_eq!(powershell_rate(0), -10);
    }

    #[test]
    fn test_detect_with_resolver() {
        let (_, first) = SpeechBackend::candidates()[0];
        let speech = CommandSpeech::detect_with(150, |name| {
            (name == first).then(|| PathBuf::from("/opt/tts").join(name))
        })
        .unwrap();

        assert_eq!(speech.program(), Path::new("/opt/tts").join(first).as_path());
        assert_eq!(speech.backend(), SpeechBackend::candidates()[0].0);
    }

    #[test]
    fn test_detect_nothing_installed() {
        let result = CommandSpeech::detect_with(150, |_| None);
        assert!(matches!(result, Err(AlertError::SpeechUnavailable(_))));
    }

    #[test]
    fn test_missing_program_fails() {
        let mut speech = CommandSpeech::new("/nonexistent/espeak-ng", SpeechBackend::EspeakNg, 150);
        assert!(matches!(
            speech.speak("hello"),
            Err(AlertError::SpeechFailed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_checked() {
        if let Ok(program) = which::which("true") {
            let mut speech = CommandSpeech::new(program, SpeechBackend::Espeak, 150);
            assert!(speech.speak("hello").is_ok());
        }

        if let Ok(program) = which::which("false") {
            let mut speech = CommandSpeech::new(program, SpeechBackend::Espeak, 150);
            assert!(matches!(
                speech.speak("hello"),
                Err(AlertError::SpeechFailed(_))
            ));
        }
    }
}
