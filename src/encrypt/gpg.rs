use std::{
    io::{self, ErrorKind, Write},
    process::{ChildStdin, Command, Output, Stdio},
    sync::OnceLock,
    thread,
};

use log::{debug, warn};
use regex::Regex;

use super::{ArmoredMessage, EncryptError, EncryptionStrategy, EphemeralKeyring, RecipientKeyId};

const IMPORT_FILE: &str = "import.asc";

/// Runs the `gpg` program with its home directory pointed at the keyring
pub struct GpgCommand {
    program: String,
}

impl GpgCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, keyring: &EphemeralKeyring) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--homedir")
            .arg(keyring.path())
            .args(["--batch", "--no-tty", "--quiet"]);
        cmd
    }

    /// Runs `cmd` feeding `input` on stdin and collects everything it writes
    fn run(&self, mut cmd: Command, input: Option<&str>) -> Result<Output, EncryptError> {
        debug!("Running {cmd:?}");
        let mut child = cmd
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncryptError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // stdout and stderr are drained while stdin is still being written, otherwise gpg
        // blocks on a full pipe once the ciphertext outgrows the pipe buffer
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer = match (input, stdin) {
                (Some(input), Some(stdin)) => Some(scope.spawn(move || feed(stdin, input))),
                _ => None,
            };
            let output = child.wait_with_output();
            let written = match writer {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, written)
        });
        let output = output?;
        written?;
        Ok(output)
    }
}

/// Writes all of `input` and closes the pipe so gpg sees the end of the plaintext.
/// gpg closes its end early when it rejects the command, its status output says why.
fn feed(mut stdin: ChildStdin, input: &str) -> io::Result<()> {
    match stdin.write_all(input.as_bytes()) {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("gpg stopped reading its input");
            Ok(())
        }
        result => result,
    }
}

impl EncryptionStrategy for GpgCommand {
    fn name(&self) -> &str {
        "gpg command"
    }

    fn import_key(
        &self,
        keyring: &EphemeralKeyring,
        key_material: &str,
    ) -> Result<Vec<String>, EncryptError> {
        let key_file = keyring.write_file(IMPORT_FILE, key_material)?;
        let mut cmd = self.command(keyring);
        cmd.args(["--status-fd", "1", "--import"]).arg(key_file);
        let output = self.run(cmd, None)?;

        let status = String::from_utf8_lossy(&output.stdout);
        let fingerprints = imported_fingerprints(&status);
        if fingerprints.is_empty() {
            return Err(EncryptError::KeyImport(format!(
                "gpg imported no keys: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !output.status.success() {
            // Happens when only part of a key block could be imported
            warn!("gpg import exited with {} but imported keys", output.status);
        }
        Ok(fingerprints)
    }

    fn encrypt(
        &self,
        keyring: &EphemeralKeyring,
        plaintext: &str,
        recipient: &RecipientKeyId,
    ) -> Result<ArmoredMessage, EncryptError> {
        let mut cmd = self.command(keyring);
        cmd.args([
            "--status-fd",
            "2",
            "--armor",
            "--trust-model",
            "always",
            "--compress-algo",
            "none",
            "--recipient",
            recipient.as_str(),
            "--encrypt",
        ]);
        let output = self.run(cmd, Some(plaintext))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let (status, diagnostic) = split_status(&stderr);
            return Err(EncryptError::Encryption {
                status: if status.is_empty() {
                    format!("gpg exited with {}", output.status)
                } else {
                    status
                },
                diagnostic,
            });
        }

        let armored = String::from_utf8(output.stdout).map_err(|e| EncryptError::Encryption {
            status: "gpg output is not valid UTF-8".to_string(),
            diagnostic: e.to_string(),
        })?;
        ArmoredMessage::new(armored)
    }
}

/// Fingerprints from the `IMPORT_OK` lines of gpg's machine readable status output
fn imported_fingerprints(status: &str) -> Vec<String> {
    static CELL: OnceLock<Regex> = OnceLock::new();
    let re = CELL.get_or_init(|| {
        Regex::new(r"(?m)^\[GNUPG:\] IMPORT_OK \d+ ([0-9A-F]{40})\s*$")
            .expect("failed to compile regex")
    });
    let mut result: Vec<String> = re
        .captures_iter(status)
        .map(|c| c[1].to_string())
        .collect();
    result.dedup();
    result
}

/// Separates status lines describing why gpg failed from the human readable messages
fn split_status(stderr: &str) -> (String, String) {
    const PREFIX: &str = "[GNUPG:] ";
    let mut status = vec![];
    let mut diagnostic = vec![];
    for line in stderr.lines() {
        match line.strip_prefix(PREFIX) {
            Some(s)
                if ["FAILURE", "INV_RECP", "NO_RECP", "KEYEXPIRED", "KEYREVOKED"]
                    .iter()
                    .any(|kw| s.starts_with(kw)) =>
            {
                status.push(s)
            }
            Some(_) => (),
            None => diagnostic.push(line),
        }
    }
    (status.join("; "), diagnostic.join("\n"))
}
