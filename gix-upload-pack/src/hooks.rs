//! Hook chains for upload-pack checkpoints.
//!
//! Each hook kind follows the same pattern: a null singleton that does
//! nothing, a chain constructor that filters nulls out of a list (collapsing
//! to the sole survivor, or staying a chain of N), and in-order invocation of
//! every member at the checkpoint. A hook returning `Err` aborts the chain
//! and the enclosing protocol phase; callers are expected to surface the
//! error to the client as a side-band error frame where one is available.

use crate::error::Result;

/// Replaces/augments the advertised ref set.
pub trait AdvertiseRefsHook: Send + Sync {
    /// Called with the repository's own ref set; returns the set to advertise.
    fn advertise_refs(&self, refs: Vec<(gix_hash::ObjectId, String)>) -> Result<Vec<(gix_hash::ObjectId, String)>> {
        Ok(refs)
    }
}

/// Observes the negotiation round and pack-send checkpoints.
pub trait PreUploadHook: Send + Sync {
    fn on_begin_negotiate_round(&self) -> Result<()> {
        Ok(())
    }

    fn on_end_negotiate_round(
        &self,
        wants: &[gix_hash::ObjectId],
        count_common: usize,
        count_not_found: usize,
        ready: bool,
    ) -> Result<()> {
        let _ = (wants, count_common, count_not_found, ready);
        Ok(())
    }

    fn on_send_pack(&self, wants: &[gix_hash::ObjectId], haves: &[gix_hash::ObjectId]) -> Result<()> {
        let _ = (wants, haves);
        Ok(())
    }
}

/// Statistics reported once pack generation has finished.
#[derive(Debug, Clone, Default)]
pub struct PackStatistics {
    pub objects_written: u64,
    pub bytes_written: u64,
}

/// Observes the finished pack send.
pub trait PostUploadHook: Send + Sync {
    fn on_pack_sent(&self, stats: &PackStatistics) -> Result<()> {
        let _ = stats;
        Ok(())
    }
}

/// Observes protocol v2 command dispatch.
pub trait ProtocolV2Hook: Send + Sync {
    fn on_capabilities(&self) -> Result<()> {
        Ok(())
    }

    fn on_ls_refs(&self) -> Result<()> {
        Ok(())
    }

    fn on_fetch(&self) -> Result<()> {
        Ok(())
    }
}

/// Null implementations used as chain elements and as defaults.
pub struct NullAdvertiseRefsHook;
impl AdvertiseRefsHook for NullAdvertiseRefsHook {}

pub struct NullPreUploadHook;
impl PreUploadHook for NullPreUploadHook {}

pub struct NullPostUploadHook;
impl PostUploadHook for NullPostUploadHook {}

pub struct NullProtocolV2Hook;
impl ProtocolV2Hook for NullProtocolV2Hook {}

/// A chain of `AdvertiseRefsHook`s, invoked in order, each receiving the
/// previous hook's output.
pub struct AdvertiseRefsHookChain {
    hooks: Vec<Box<dyn AdvertiseRefsHook>>,
}

impl AdvertiseRefsHookChain {
    pub fn new(hooks: Vec<Box<dyn AdvertiseRefsHook>>) -> Self {
        Self { hooks }
    }
}

impl AdvertiseRefsHook for AdvertiseRefsHookChain {
    fn advertise_refs(&self, refs: Vec<(gix_hash::ObjectId, String)>) -> Result<Vec<(gix_hash::ObjectId, String)>> {
        let mut refs = refs;
        for hook in &self.hooks {
            refs = hook.advertise_refs(refs)?;
        }
        Ok(refs)
    }
}

/// A chain of `PreUploadHook`s, invoked in order at each checkpoint.
pub struct PreUploadHookChain {
    hooks: Vec<Box<dyn PreUploadHook>>,
}

impl PreUploadHookChain {
    pub fn new(hooks: Vec<Box<dyn PreUploadHook>>) -> Self {
        Self { hooks }
    }
}

impl PreUploadHook for PreUploadHookChain {
    fn on_begin_negotiate_round(&self) -> Result<()> {
        for hook in &self.hooks {
            hook.on_begin_negotiate_round()?;
        }
        Ok(())
    }

    fn on_end_negotiate_round(
        &self,
        wants: &[gix_hash::ObjectId],
        count_common: usize,
        count_not_found: usize,
        ready: bool,
    ) -> Result<()> {
        for hook in &self.hooks {
            hook.on_end_negotiate_round(wants, count_common, count_not_found, ready)?;
        }
        Ok(())
    }

    fn on_send_pack(&self, wants: &[gix_hash::ObjectId], haves: &[gix_hash::ObjectId]) -> Result<()> {
        for hook in &self.hooks {
            hook.on_send_pack(wants, haves)?;
        }
        Ok(())
    }
}

/// A chain of `PostUploadHook`s, invoked in order.
pub struct PostUploadHookChain {
    hooks: Vec<Box<dyn PostUploadHook>>,
}

impl PostUploadHookChain {
    pub fn new(hooks: Vec<Box<dyn PostUploadHook>>) -> Self {
        Self { hooks }
    }
}

impl PostUploadHook for PostUploadHookChain {
    fn on_pack_sent(&self, stats: &PackStatistics) -> Result<()> {
        for hook in &self.hooks {
            hook.on_pack_sent(stats)?;
        }
        Ok(())
    }
}

/// The hook chains configured for a server, bundled for threading through
/// `ServerOptions` into the v1/v2 handlers.
///
/// Each field defaults to a no-op null hook so a server that configures no
/// hooks behaves exactly as if hooks didn't exist.
#[derive(Clone)]
pub struct UploadPackHooks {
    pub advertise_refs: std::sync::Arc<dyn AdvertiseRefsHook>,
    pub pre_upload: std::sync::Arc<dyn PreUploadHook>,
    pub post_upload: std::sync::Arc<dyn PostUploadHook>,
    pub protocol_v2: std::sync::Arc<dyn ProtocolV2Hook>,
}

impl Default for UploadPackHooks {
    fn default() -> Self {
        Self {
            advertise_refs: std::sync::Arc::new(NullAdvertiseRefsHook),
            pre_upload: std::sync::Arc::new(NullPreUploadHook),
            post_upload: std::sync::Arc::new(NullPostUploadHook),
            protocol_v2: std::sync::Arc::new(NullProtocolV2Hook),
        }
    }
}

impl std::fmt::Debug for UploadPackHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPackHooks").finish_non_exhaustive()
    }
}

/// A chain of `ProtocolV2Hook`s, invoked in order.
pub struct ProtocolV2HookChain {
    hooks: Vec<Box<dyn ProtocolV2Hook>>,
}

impl ProtocolV2HookChain {
    pub fn new(hooks: Vec<Box<dyn ProtocolV2Hook>>) -> Self {
        Self { hooks }
    }
}

impl ProtocolV2Hook for ProtocolV2HookChain {
    fn on_capabilities(&self) -> Result<()> {
        for hook in &self.hooks {
            hook.on_capabilities()?;
        }
        Ok(())
    }

    fn on_ls_refs(&self) -> Result<()> {
        for hook in &self.hooks {
            hook.on_ls_refs()?;
        }
        Ok(())
    }

    fn on_fetch(&self) -> Result<()> {
        for hook in &self.hooks {
            hook.on_fetch()?;
        }
        Ok(())
    }
}
