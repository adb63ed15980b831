//! Push-certificate parsing.
//!
//! A push certificate rides the wire between the command list and the pack
//! data, introduced by a literal `push-cert\n` line. Its body is a
//! signed-attribute block followed by the commands it covers and a trailing
//! GPG signature. The engine only cares about extracting `nonce` for
//! verification (`crate::nonce::verify`); trusting the signature itself is
//! left to the caller.

use crate::Error;

/// The literal line that introduces a push certificate block on the wire.
pub const MARKER: &str = "push-cert";

/// A parsed push certificate.
///
/// `raw` retains the certificate verbatim (attributes, command list, and
/// signature block) so a caller can perform its own GPG trust decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCertificate {
    pub version: String,
    pub pusher: String,
    pub pushee: String,
    pub nonce: String,
    pub push_options: Vec<String>,
    pub commands: Vec<String>,
    pub signature: String,
    pub raw: String,
}

impl PushCertificate {
    /// Parse a push certificate body (everything after the `push-cert\n` marker line,
    /// up to and including the PGP signature block).
    ///
    /// Expected shape:
    /// ```text
    /// certificate version <n>
    /// pusher <identity>
    /// pushee <url>
    /// nonce <nonce>
    /// push-option <value>        (zero or more)
    ///                             (blank line)
    /// <old> <new> <ref>           (one or more)
    /// -----BEGIN PGP SIGNATURE-----
    /// ...
    /// -----END PGP SIGNATURE-----
    /// ```
    pub fn parse(body: &str) -> Result<Self, Error> {
        let mut version = None;
        let mut pusher = None;
        let mut pushee = None;
        let mut nonce = None;
        let mut push_options = Vec::new();
        let mut commands = Vec::new();
        let mut signature_lines = Vec::new();

        let mut lines = body.lines();
        let mut in_commands = false;
        let mut in_signature = false;

        for line in &mut lines {
            if in_signature {
                signature_lines.push(line);
                if line.trim_end() == "-----END PGP SIGNATURE-----" {
                    break;
                }
                continue;
            }
            if line.trim_end() == "-----BEGIN PGP SIGNATURE-----" {
                in_signature = true;
                signature_lines.push(line);
                continue;
            }
            if in_commands {
                if !line.is_empty() {
                    commands.push(line.to_string());
                }
                continue;
            }
            if line.is_empty() {
                in_commands = true;
                continue;
            }
            if let Some(v) = line.strip_prefix("certificate version ") {
                version = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("pusher ") {
                pusher = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("pushee ") {
                pushee = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("nonce ") {
                nonce = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("push-option ") {
                push_options.push(v.to_string());
            } else {
                return Err(Error::Protocol(format!("unrecognized push certificate attribute line: {line:?}")));
            }
        }

        let version = version.ok_or_else(|| Error::Protocol("push certificate missing 'certificate version'".into()))?;
        let pusher = pusher.ok_or_else(|| Error::Protocol("push certificate missing 'pusher'".into()))?;
        let pushee = pushee.ok_or_else(|| Error::Protocol("push certificate missing 'pushee'".into()))?;
        let nonce = nonce.ok_or_else(|| Error::Protocol("push certificate missing 'nonce'".into()))?;
        if commands.is_empty() {
            return Err(Error::Protocol("push certificate covers zero commands".into()));
        }
        if signature_lines.is_empty() {
            return Err(Error::Protocol("push certificate missing PGP signature block".into()));
        }

        Ok(Self {
            version,
            pusher,
            pushee,
            nonce,
            push_options,
            commands,
            signature: signature_lines.join("\n"),
            raw: body.to_string(),
        })
    }
}
