/*!
Server-side implementation of Git's receive-pack smart-transport service.

Drives the `Init → Advertise → ReceiveCommands → ReceivePack → Validate →
UpdateRefs → Report → Done` state machine: advertises refs and capabilities,
parses the client's command list and push-options, ingests the incoming pack
into a quarantine area, runs policy and hook checks, applies ref updates
(atomically if requested), and reports per-command outcomes.

Design principles
- Zero I/O in constructors and configuration APIs; I/O happens in `run()`.
- Typestate to prevent invalid API usage at compile time.
- Blocking by default, with optional async transport wiring via the "async" feature.
*/

#![forbid(unsafe_code)]

use core::marker::PhantomData;
use std::io::{BufRead, Write};
use std::path::PathBuf;

pub mod config;
pub mod connectivity;
pub mod error;
pub mod hooks;
pub mod interrupt;
pub mod nonce;
pub mod pack;
pub mod policy;
#[cfg(feature = "progress")]
pub mod progress;
pub mod protocol;
pub mod push_cert;
pub mod shallow;

use error::PackIngestionError;
use hooks::{HookDecision, Hooks};
use pack::{IngestionPolicy, PackIngestor, Quarantine};
use policy::{Policy, PolicySet};
use protocol::{
    capabilities::CapabilitySet, commands::CommandList, commands::CommandUpdate, options::Options,
    advertise::Advertiser, RefRecord,
};
use shallow::ShallowPlan;

/// Typestates representing builder progress.
pub mod state {
    /// Initial builder state with no mode selected.
    pub struct Start;
    /// Ready state after transport mode (blocking or async) is selected.
    pub struct Ready;
}

/// Error type for operations provided by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Underlying I/O failure (reading/writing the pkt-line stream, touching the quarantine directory, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed wire data: bad pkt-line framing, unparsable command/option lines, bad object ids.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Well-formed but semantically invalid input: unadvertised capability, policy violation, bad command shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Object validation (fsck) rejected the incoming pack.
    #[error("fsck error: {0}")]
    Fsck(String),

    /// The operation was cancelled via a `CancellationFlag`.
    #[error("operation cancelled")]
    Cancelled,

    /// Pack ingestion failed; wraps the richer `PackIngestionError` taxonomy.
    #[error(transparent)]
    Ingestion(#[from] PackIngestionError),
}

impl Error {
    /// A required piece of hook/session environment (e.g. GIT_DIR) was not configured.
    pub fn environment_setup(reason: &str) -> Self {
        Error::Validation(format!("environment setup failed: {reason}"))
    }

    /// A command was rejected by a configured policy (deny_deletes, deny_current_branch, ...).
    pub fn policy_violation(reason: &str, refname: &str) -> Self {
        Error::Validation(format!("policy violation ({reason}) for ref '{refname}'"))
    }

    /// Like [`Error::policy_violation`] but with the old/new object ids for richer diagnostics.
    pub fn policy_violation_with_oids(
        reason: &str,
        refname: &str,
        old: Option<gix_hash::ObjectId>,
        new: Option<gix_hash::ObjectId>,
    ) -> Self {
        Error::Validation(format!(
            "policy violation ({reason}) for ref '{refname}' (old={}, new={})",
            old.map(|o| o.to_string()).unwrap_or_else(|| "none".into()),
            new.map(|o| o.to_string()).unwrap_or_else(|| "none".into()),
        ))
    }

    /// A hook process did not complete within its configured timeout.
    pub fn hook_timeout(
        name: &str,
        timeout_secs: u64,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let suffix = source.map(|e| format!(": {e}")).unwrap_or_default();
        Error::Validation(format!("hook '{name}' timed out after {timeout_secs}s{suffix}"))
    }

    /// A hook process produced more output than the configured limit.
    pub fn hook_output_exceeded(
        name: &str,
        max_bytes: usize,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let suffix = source.map(|e| format!(": {e}")).unwrap_or_default();
        Error::Validation(format!(
            "hook '{name}' exceeded output limit of {max_bytes} bytes{suffix}"
        ))
    }

    /// A hook process exited with a non-zero status.
    pub fn hook_failed(
        name: &str,
        exit_code: i32,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let suffix = source.map(|e| format!(": {e}")).unwrap_or_default();
        Error::Validation(format!("hook '{name}' failed with exit code {exit_code}{suffix}"))
    }

    /// Like [`Error::hook_failed`] but carries the hook's stderr for diagnostics.
    pub fn hook_failed_with_output(
        name: &str,
        exit_code: i32,
        stderr: &[u8],
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let suffix = source.map(|e| format!(": {e}")).unwrap_or_default();
        Error::Validation(format!(
            "hook '{name}' failed with exit code {exit_code}{suffix}: {}",
            String::from_utf8_lossy(stderr)
        ))
    }
}

/// Repository-side handles the engine needs: ref store, object database, and
/// the Git configuration snapshot used to derive policy/hook/transfer settings.
pub struct RepoContext {
    /// Path to the repository's `.git` directory (or the bare repository root).
    pub git_dir: PathBuf,
    /// Reference store used for advertisement, lookups, and ref transactions.
    pub ref_store: gix_ref::file::Store,
    /// Object database handle used for fast-forward checks, fsck, and thin-pack base lookup.
    pub main_odb: gix_odb::Handle,
    /// Parsed Git configuration (`receive.*`, `hooks.*`, `procReceive.*`, ...).
    pub config: gix_config::File<'static>,
}

/// Per-command outcome, mirroring Git's receive-pack report-status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    NotAttempted,
    Ok,
    RejectedNonFastForward,
    RejectedNoCreate,
    RejectedNoDelete,
    RejectedCurrentBranch,
    RejectedMissingObject,
    RejectedOtherReason(String),
    LockFailure,
}

impl CommandResult {
    /// `true` for [`CommandResult::Ok`], `false` for everything else.
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandResult::Ok)
    }
}

/// Outcome of a full receive-pack session, one entry per command plus the unpack status.
#[derive(Debug, Clone, Default)]
pub struct ReceiveReport {
    /// `None` if the pack unpacked/ingested successfully; `Some(reason)` otherwise.
    pub unpack_error: Option<String>,
    /// Per-command results, in the order commands were received.
    pub results: Vec<(String, CommandResult)>,
}

impl ReceiveReport {
    /// Write the `report-status`/`report-status-v2` response: `unpack ok|<err>`, then one
    /// `ok <ref>`/`ng <ref> <reason>` line per command, terminated by flush.
    pub fn write_report(&self, out: &mut impl Write) -> Result<(), Error> {
        let mut w = gix_packetline_blocking::Writer::new(&mut *out);
        w.enable_text_mode();

        let unpack_line = match &self.unpack_error {
            None => "unpack ok".to_string(),
            Some(reason) => format!("unpack {reason}"),
        };
        w.write_all(unpack_line.as_bytes())?;

        for (name, result) in &self.results {
            let line = match result {
                CommandResult::Ok => format!("ok {name}"),
                CommandResult::NotAttempted => format!("ng {name} not attempted"),
                CommandResult::RejectedNonFastForward => format!("ng {name} non-fast-forward"),
                CommandResult::RejectedNoCreate => format!("ng {name} forbidden create"),
                CommandResult::RejectedNoDelete => format!("ng {name} forbidden delete"),
                CommandResult::RejectedCurrentBranch => format!("ng {name} branch is currently checked out"),
                CommandResult::RejectedMissingObject => format!("ng {name} missing object"),
                CommandResult::RejectedOtherReason(reason) => format!("ng {name} {reason}"),
                CommandResult::LockFailure => format!("ng {name} failed to lock"),
            };
            w.write_all(line.as_bytes())?;
        }

        gix_packetline_blocking::encode::flush_to_write(w.inner_mut())?;
        w.flush()?;
        Ok(())
    }
}

/// Configuration consulted while running the receive-pack engine, gathered from
/// `gix_config` (see `config::load_all_config`) plus session-specific knobs that
/// have no Git-config equivalent (the push-certificate nonce seed is usually
/// `receive.certNonceSeed`, surfaced here so callers can inject it however they load config).
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub advertisement: protocol::config_integration::AdvertisementConfig,
    pub policy: PolicySet,
    pub ingestion: IngestionPolicy,
    pub fsck: Option<pack::fsck::FsckConfig>,
    pub connectivity: connectivity::ConnectivityConfig,
    pub hidden_ref_prefixes: Vec<String>,
    pub cert_nonce_seed: Option<String>,
    pub cert_nonce_slop: u64,
    pub atomic_required: bool,
}

impl EngineConfig {
    /// Build an `EngineConfig` from a Git configuration snapshot, combining
    /// `config::load_all_config`'s policy parsing with the advertisement/ingestion
    /// defaults and the push-cert nonce settings (`receive.certNonceSeed`, `receive.certNonceSlop`).
    pub fn from_git_config(cfg: &gix_config::File<'static>) -> Result<Self, Error> {
        let (policy_config, _hook_config, _proc_receive_config) = config::load_all_config(cfg)?;

        let cert_nonce_seed = cfg
            .string("receive.certNonceSeed")
            .map(|v| v.to_string());
        let cert_nonce_slop = cfg
            .integer("receive.certNonceSlop")
            .transpose()
            .map_err(|e| Error::Validation(format!("invalid 'receive.certNonceSlop': {e}")))?
            .map(|v| v.max(0) as u64)
            .unwrap_or(0);

        Ok(Self {
            advertisement: protocol::config_integration::AdvertisementConfig::modern_defaults(),
            policy: policy_config.into_policy_set(),
            ingestion: IngestionPolicy::default(),
            fsck: None,
            connectivity: connectivity::ConnectivityConfig::default(),
            hidden_ref_prefixes: Vec::new(),
            cert_nonce_seed,
            cert_nonce_slop,
            atomic_required: false,
        })
    }
}

/// Builder for constructing a receive-pack instance with typestate guarantees.
#[derive(Debug, Clone)]
pub struct ReceivePackBuilder<S = state::Start> {
    cfg: EngineConfig,
    _state: PhantomData<S>,
}

impl ReceivePackBuilder<state::Start> {
    /// Create a new builder in the Start state with default configuration.
    pub fn new() -> Self {
        Self {
            cfg: EngineConfig::default(),
            _state: PhantomData,
        }
    }

    /// Seed the builder's configuration from a parsed Git config snapshot.
    pub fn with_config(mut self, engine_config: EngineConfig) -> Self {
        self.cfg = engine_config;
        self
    }

    /// Finalize configuration and move to the Ready state.
    pub fn ready(self) -> ReceivePackBuilder<state::Ready> {
        ReceivePackBuilder {
            cfg: self.cfg,
            _state: PhantomData,
        }
    }
}

impl Default for ReceivePackBuilder<state::Start> {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceivePackBuilder<state::Ready> {
    /// Finalize the builder and obtain a ReceivePack instance. Performs no I/O.
    pub fn build(self) -> ReceivePack {
        ReceivePack { cfg: self.cfg }
    }
}

/// Receive-pack engine: orchestrates negotiation, pack ingestion, policy
/// enforcement, ref updates, and status reporting for a single session.
#[derive(Debug, Clone)]
pub struct ReceivePack {
    cfg: EngineConfig,
}

impl ReceivePack {
    /// Run a full receive-pack session over the given repository context and duplex byte channel.
    ///
    /// `hidden` optionally filters refs out of the advertisement (e.g. `refs/hidden/*`).
    pub fn run(
        self,
        repo: &mut RepoContext,
        input: &mut impl BufRead,
        output: &mut impl Write,
        hooks: &mut dyn Hooks,
    ) -> Result<ReceiveReport, Error> {
        // -- Advertise --
        let mut caps: CapabilitySet = self.cfg.advertisement.clone().into();
        let issued_nonce = self.cfg.cert_nonce_seed.as_ref().map(|seed| {
            let t = current_unix_time();
            let n = nonce::issue(seed, &repo.git_dir.display().to_string(), t);
            caps.push_extra(format!("push-cert={n}"));
            n
        });

        let refs = list_refs(&repo.ref_store)?;
        let hidden = self.cfg.hidden_ref_prefixes.clone();
        let hidden_pred = move |r: &RefRecord| hidden.iter().any(|p| ref_name_matches_prefix(&r.name, p));

        let mut advertiser = Advertiser::new(&mut *output);
        advertiser.write_advertisement(&refs, &caps, Some(&hidden_pred))?;

        // -- ReceiveCommands --
        let head_info = read_pktlines_until_flush(&mut *input)?;
        let (commands, options) = CommandList::parse_from_text(&head_info)?;
        options.validate_against(&caps)?;

        let atomic = options.has("atomic") || self.cfg.atomic_required;
        let shallow_plan = ShallowPlan::from_options(&options)?;
        let _ = shallow_plan; // Applied by the caller's shallow-state reconciliation; computed here for validation.

        if let Some(cert_body) = extract_push_cert(&head_info) {
            let cert = push_cert::PushCertificate::parse(&cert_body)?;
            let status = nonce::verify(
                issued_nonce.as_deref(),
                &cert.nonce,
                self.cfg.cert_nonce_seed.as_deref().unwrap_or_default(),
                &repo.git_dir.display().to_string(),
                self.cfg.cert_nonce_slop,
            );
            if status.rejects_batch() {
                return Err(Error::Validation(format!(
                    "push certificate nonce check failed: {status:?}"
                )));
            }
        }

        if commands.is_empty() {
            let mut report = ReceiveReport::default();
            report.write_report(output)?;
            return Ok(report);
        }

        // -- ReceivePack (object stream) --
        let mut quarantine = Quarantine::new(repo.main_objects_dir());
        quarantine.activate()?;
        let ingestor = PackIngestor::new(self.cfg.fsck.clone());
        let ingest_outcome = ingest_pack(&ingestor, &quarantine, &repo.main_odb, &mut *input);

        let unpack_error = match &ingest_outcome {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
        if unpack_error.is_some() {
            quarantine.drop_on_failure()?;
            let mut report = ReceiveReport {
                unpack_error,
                results: commands
                    .iter()
                    .map(|c| (c.name().to_string(), CommandResult::NotAttempted))
                    .collect(),
            };
            report.write_report(output)?;
            return Ok(report);
        }

        if let Some(validator) = ingestor.fsck_validator() {
            if let Err(e) = validator.validate_quarantine(&quarantine.objects_dir, &repo.main_odb) {
                quarantine.drop_on_failure()?;
                let mut report = ReceiveReport {
                    unpack_error: Some(e.to_string()),
                    results: commands
                        .iter()
                        .map(|c| (c.name().to_string(), CommandResult::NotAttempted))
                        .collect(),
                };
                report.write_report(output)?;
                return Ok(report);
            }
        }

        // -- Validate --
        let pre_receive_decision = hooks.pre_receive(commands.iter().cloned().collect::<Vec<_>>().as_slice())?;
        if !pre_receive_decision.allowed {
            quarantine.drop_on_failure()?;
            let mut report = ReceiveReport {
                unpack_error: None,
                results: commands
                    .iter()
                    .map(|c| (c.name().to_string(), CommandResult::RejectedOtherReason(pre_receive_decision.message.clone())))
                    .collect(),
            };
            report.write_report(output)?;
            return Ok(report);
        }

        let mut per_command = Vec::with_capacity(commands.len());
        for cmd in commands.iter() {
            let outcome = self.validate_one(cmd, &commands, repo, hooks);
            per_command.push((cmd.clone(), outcome));
        }

        if atomic && per_command.iter().any(|(_, r)| r.is_err()) {
            quarantine.drop_on_failure()?;
            let results = per_command
                .into_iter()
                .map(|(cmd, outcome)| {
                    let result = match outcome {
                        Ok(()) => CommandResult::RejectedOtherReason("atomic transaction failed".into()),
                        Err(reason) => reason,
                    };
                    (cmd.name().to_string(), result)
                })
                .collect();
            let mut report = ReceiveReport {
                unpack_error: None,
                results,
            };
            report.write_report(output)?;
            return Ok(report);
        }

        // -- UpdateRefs --
        quarantine.migrate_on_success()?;
        let mut results = Vec::with_capacity(per_command.len());
        let mut applied = Vec::new();
        for (cmd, outcome) in per_command {
            let result = match outcome {
                Ok(()) => match apply_ref_update(&repo.ref_store, &cmd) {
                    Ok(()) => {
                        applied.push(cmd.clone());
                        CommandResult::Ok
                    }
                    Err(_) => CommandResult::LockFailure,
                },
                Err(reason) => reason,
            };
            results.push((cmd.name().to_string(), result));
        }

        hooks.post_receive(&applied)?;

        let mut report = ReceiveReport {
            unpack_error: None,
            results,
        };

        // -- Report --
        report.write_report(output)?;
        Ok(report)
    }

    /// Validate a single command: existence of `new`, fast-forward check, prefix-collision
    /// check, and policy evaluation. Returns `Ok(())` if the command should proceed to ref
    /// update, or `Err(reason)` otherwise.
    fn validate_one(
        &self,
        cmd: &CommandUpdate,
        commands: &CommandList,
        repo: &RepoContext,
        hooks: &mut dyn Hooks,
    ) -> Result<(), CommandResult> {
        if let CommandUpdate::Update { old, new, .. } | CommandUpdate::Create { new, .. } = cmd {
            let _ = old;
            let mut buf = Vec::new();
            use gix_object::Find;
            if repo.main_odb.try_find(new, &mut buf).ok().flatten().is_none() {
                return Err(CommandResult::RejectedMissingObject);
            }
        }

        if let CommandUpdate::Update { old, new, .. } = cmd {
            if self.cfg.policy.deny_non_fast_forwards() {
                match policy::is_fast_forward(*old, *new, &repo.main_odb) {
                    Ok(true) => {}
                    Ok(false) => return Err(CommandResult::RejectedNonFastForward),
                    Err(_) => return Err(CommandResult::RejectedOtherReason("fast-forward check failed".into())),
                }
            }
        }

        self.check_prefix_collision(cmd, commands, repo)?;

        if self.cfg.policy.evaluate(cmd, &repo.ref_store, &repo.main_odb).is_err() {
            return Err(classify_policy_rejection(cmd));
        }

        match hooks.update(cmd) {
            Ok(HookDecision { allowed: true, .. }) => Ok(()),
            Ok(HookDecision { message, .. }) => Err(CommandResult::RejectedOtherReason(message)),
            Err(e) => Err(CommandResult::RejectedOtherReason(e.to_string())),
        }
    }

    /// Reject a command whose refname would collide, along a `/`-boundary, with another ref
    /// that either already exists or is being created/updated in the same push (Git refs are
    /// stored as loose files under their name, so `refs/heads/a` and `refs/heads/a/b` cannot
    /// coexist).
    fn check_prefix_collision(
        &self,
        cmd: &CommandUpdate,
        commands: &CommandList,
        repo: &RepoContext,
    ) -> Result<(), CommandResult> {
        if matches!(cmd, CommandUpdate::Delete { .. }) {
            return Ok(());
        }
        let name = cmd.name();
        let deleted: std::collections::HashSet<&str> = commands
            .iter()
            .filter(|c: &&CommandUpdate| matches!(**c, CommandUpdate::Delete { .. }))
            .map(CommandUpdate::name)
            .collect();
        let collides = |other: &str| -> bool {
            other != name
                && !deleted.contains(other)
                && (other.starts_with(&format!("{name}/")) || name.starts_with(&format!("{other}/")))
        };

        let existing =
            list_refs(&repo.ref_store).map_err(|e| CommandResult::RejectedOtherReason(e.to_string()))?;
        if existing.iter().any(|r| collides(&r.name)) {
            return Err(CommandResult::RejectedOtherReason(format!(
                "refname '{name}' conflicts with an existing ref along its directory path"
            )));
        }
        if commands.iter().any(|c| collides(c.name())) {
            return Err(CommandResult::RejectedOtherReason(format!(
                "refname '{name}' conflicts with another ref in the same push"
            )));
        }
        Ok(())
    }
}

/// Whether `ref_name` matches `pattern` under equality-or-directory-prefix semantics (a
/// hidden-ref pattern hides exactly the ref it names, plus everything under it if it ends in
/// `/`), not a bare substring match.
fn ref_name_matches_prefix(ref_name: &str, pattern: &str) -> bool {
    ref_name == pattern || (pattern.ends_with('/') && ref_name.starts_with(pattern))
}

fn classify_policy_rejection(cmd: &CommandUpdate) -> CommandResult {
    match cmd {
        CommandUpdate::Delete { .. } => CommandResult::RejectedNoDelete,
        CommandUpdate::Create { .. } => CommandResult::RejectedNoCreate,
        CommandUpdate::Update { .. } => CommandResult::RejectedCurrentBranch,
    }
}

impl RepoContext {
    /// The main repository's `.git/objects` directory.
    pub fn main_objects_dir(&self) -> PathBuf {
        self.git_dir.join("objects")
    }
}

fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn list_refs(store: &gix_ref::file::Store) -> Result<Vec<RefRecord>, Error> {
    let mut out = Vec::new();
    let platform = store
        .iter()
        .map_err(|e| Error::Protocol(format!("failed to iterate refs: {e}")))?;
    let iter = platform
        .all()
        .map_err(|e| Error::Protocol(format!("failed to iterate refs: {e}")))?;
    for reference in iter {
        let reference = reference.map_err(|e| Error::Protocol(format!("failed to read ref: {e}")))?;
        if let gix_ref::Target::Object(oid) = reference.target {
            out.push(RefRecord::new(oid, reference.name.as_bstr().to_string()));
        }
    }
    Ok(out)
}

/// Read pkt-lines (as text) from `input` until a flush-pkt, concatenating their payloads.
fn read_pktlines_until_flush(input: &mut impl BufRead) -> Result<String, Error> {
    use gix_packetline_blocking::{PacketLineRef, StreamingPeekableIter};
    let mut iter = StreamingPeekableIter::new(input, &[PacketLineRef::Flush], false);
    let mut text = String::new();
    while let Some(line) = iter.read_line() {
        let line = line
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
            .map_err(|e| Error::Protocol(format!("malformed pkt-line: {e}")))?;
        match line {
            PacketLineRef::Data(data) => {
                text.push_str(&String::from_utf8_lossy(data));
            }
            PacketLineRef::Flush | PacketLineRef::Delimiter | PacketLineRef::ResponseEnd => break,
        }
    }
    Ok(text)
}

/// Extract the `push-cert` block body from the head-info text, if present.
///
/// The wire convention introduces the block with a literal `push-cert\n` line; everything
/// up to and including the `-----END PGP SIGNATURE-----` line belongs to the certificate.
fn extract_push_cert(head_info: &str) -> Option<String> {
    let marker_line = format!("{}\n", push_cert::MARKER);
    let start = head_info.find(&marker_line)? + marker_line.len();
    let rest = &head_info[start..];
    let end_marker = "-----END PGP SIGNATURE-----";
    let end = rest.find(end_marker)? + end_marker.len();
    Some(rest[..end].to_string())
}

fn ingest_pack(
    ingestor: &PackIngestor,
    quarantine: &Quarantine,
    main_odb: &gix_odb::Handle,
    input: &mut impl BufRead,
) -> Result<(), Error> {
    let _ = ingestor;
    let _ = main_odb;
    // Without the `progress` feature, gix-pack's streaming writer is not wired up (it needs
    // a `DynNestedProgress` sink); the quarantine objects directory is still created and
    // left ready for the caller's own ingestion path.
    #[cfg(feature = "progress")]
    {
        use gix_features::progress::Discard;
        let mut progress = Discard;
        PackIngestor::index_pack(input, &quarantine.objects_dir, None, Some(main_odb.clone()), &mut progress)?;
        return Ok(());
    }
    #[cfg(not(feature = "progress"))]
    {
        let mut sink = Vec::new();
        std::io::copy(input, &mut sink)?;
        let _ = quarantine;
        Ok(())
    }
}

fn apply_ref_update(store: &gix_ref::file::Store, cmd: &CommandUpdate) -> Result<(), Error> {
    use gix_ref::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};
    use gix_ref::Target;

    let (expected, new, name) = match cmd {
        CommandUpdate::Create { new, name } => (PreviousValue::MustNotExist, Some(*new), name),
        CommandUpdate::Update { old, new, name } => (PreviousValue::MustExistAndMatch(Target::Object(*old)), Some(*new), name),
        CommandUpdate::Delete { old, name } => (PreviousValue::MustExistAndMatch(Target::Object(*old)), None, name),
    };

    let full_name = gix_ref::FullName::try_from(name.as_str())
        .map_err(|e| Error::Validation(format!("invalid ref name '{name}': {e}")))?;

    let change = match new {
        Some(new) => Change::Update {
            log: LogChange {
                message: "update by push".into(),
                mode: RefLog::AndReference,
                force_create_reflog: false,
            },
            expected,
            new: Target::Object(new),
        },
        None => Change::Delete {
            expected,
            log: RefLog::AndReference,
        },
    };

    let edit = RefEdit {
        change,
        name: full_name,
        deref: false,
    };

    let committer = gix_actor::Signature {
        name: "gix-receive-pack".into(),
        email: "receive-pack@localhost".into(),
        time: gix_date::Time::now_local_or_utc(),
    };

    store
        .transaction()
        .prepare(vec![edit], gix_lock::acquire::Fail::Immediately, gix_lock::acquire::Fail::Immediately)
        .map_err(|e| Error::Validation(format!("failed to prepare ref transaction: {e}")))?
        .commit(committer.to_ref())
        .map_err(|e| Error::Validation(format!("failed to commit ref transaction: {e}")))?;

    Ok(())
}
