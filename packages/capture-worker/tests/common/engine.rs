//! Fake archiving engines.
//!
//! Each engine is a `sh` script that accepts the real engine's command line,
//! records its arguments, then does whatever the scenario needs. Scripts are
//! run as `sh <script>` so no executable bit is needed.

use std::path::{Path, PathBuf};

/// Parses the managed flags into shell variables and logs every argument.
const PRELUDE: &str = r#"
url="$1"
shift
while [ $# -gt 0 ]; do
  case "$1" in
    --output) output="$2"; shift ;;
    --format) format="$2"; shift ;;
    --json-summary-output) summary="$2"; shift ;;
    --export-attachments-output) attachments="$2"; shift ;;
    --proxy-port) port="$2"; shift ;;
  esac
  shift
done
"#;

const WRITE_ATTACHMENTS: &str = r#"
printf 'png' > "$attachments/screenshot.png"
printf 'pem' > "$attachments/cert1.pem"
"#;

const WRITE_ARCHIVE: &str = r#"
printf 'archive' > "$output"
"#;

const WRITE_SUMMARY: &str = r#"
cat > "$summary" <<JSON
{"url": "$url", "format": "$format", "attachments": {"screenshot": "screenshot.png", "certificates": ["cert1.pem"]}}
JSON
"#;

const WRITE_SUMMARY_WITH_NUL: &str = r#"
cat > "$summary" <<JSON
{"url": "$url", "title": "bad\u0000title", "attachments": {"screenshot": "screenshot.png", "certificates": ["cert1.pem"]}}
JSON
"#;

#[derive(Debug, Clone)]
pub struct FakeEngine {
    body: String,
}

impl FakeEngine {
    pub fn from_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Writes archive, summary and every listed attachment, exits 0.
    pub fn successful() -> Self {
        Self::from_body(format!(
            "echo \"capturing $url on port $port\"\n{WRITE_ARCHIVE}{WRITE_ATTACHMENTS}{WRITE_SUMMARY}"
        ))
    }

    /// Succeeds, but writes NUL bytes to both output streams.
    pub fn binary_output() -> Self {
        Self::from_body(format!(
            "printf 'frame\\000data\\n'\nprintf 'warn\\000ing\\n' >&2\n{WRITE_ARCHIVE}{WRITE_ATTACHMENTS}{WRITE_SUMMARY}"
        ))
    }

    /// Succeeds with a summary holding an escaped NUL character.
    pub fn nul_in_summary() -> Self {
        Self::from_body(format!(
            "{WRITE_ARCHIVE}{WRITE_ATTACHMENTS}{WRITE_SUMMARY_WITH_NUL}"
        ))
    }

    /// Everything except `cert1.pem`, exits 0.
    pub fn missing_certificate() -> Self {
        Self::from_body(format!(
            "{WRITE_ARCHIVE}printf 'png' > \"$attachments/screenshot.png\"\n{WRITE_SUMMARY}"
        ))
    }

    /// Everything except the archive, exits 0.
    pub fn missing_archive() -> Self {
        Self::from_body(format!("{WRITE_ATTACHMENTS}{WRITE_SUMMARY}"))
    }

    /// Archive present, summary is not JSON, exits 0.
    pub fn malformed_summary() -> Self {
        Self::from_body(format!("{WRITE_ARCHIVE}printf '{{not json' > \"$summary\"\n"))
    }

    pub fn failing(exit_code: i32) -> Self {
        Self::from_body(format!(
            "echo 'navigation failed' >&2\nexit {exit_code}\n"
        ))
    }

    /// Runs until stopped; exits cleanly on SIGTERM.
    pub fn hanging() -> Self {
        Self::from_body("trap 'echo terminated; exit 143' TERM\nsleep 30 &\nwait $!\n")
    }

    /// Runs until force-killed.
    pub fn ignoring_sigterm() -> Self {
        Self::from_body("trap '' TERM\nsleep 30\n")
    }

    /// Write the script into `dir`, returning its path.
    pub fn install(&self, dir: &Path) -> PathBuf {
        let script = dir.join("engine.sh");
        let args_log = dir.join("engine-args.txt");
        let contents = format!(
            "printf '%s\\n' \"$@\" >> '{}'\n{PRELUDE}{}",
            args_log.display(),
            self.body
        );
        std::fs::write(&script, contents).expect("write fake engine");
        script
    }
}

/// Arguments of every engine run so far, one entry per line.
pub fn recorded_engine_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("engine-args.txt"))
        .map(|raw| raw.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
