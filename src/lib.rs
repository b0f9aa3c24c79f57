//! Chatshot batch screenshot pipeline
//!
//! Renders large batches of synthetic messaging-app screenshots from
//! conversation transcripts and user-supplied images. Conversations are
//! windowed around an inserted image, resolved into platform-specific
//! markup, captured through a pooled headless-browser renderer, and packed
//! into a ZIP archive with a per-job manifest.
//!
//! # Pipeline
//!
//! windowing -> markup resolution -> pooled browser capture -> archive
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatshot::{
//!     run_batch, BatchRequest, CancelFlag, CdpFactory, EvidenceImage,
//!     PipelineConfig, RenderPool, TemplateRegistry,
//! };
//!
//! # async fn demo() -> chatshot::Result<()> {
//! let config = PipelineConfig::default();
//! let registry = Arc::new(TemplateRegistry::builtin());
//! let canvas = registry.get("whatsapp")?.canvas;
//! let pool = Arc::new(
//!     RenderPool::new(
//!         Arc::new(CdpFactory::new(canvas)),
//!         config.pool_size,
//!         config.capture_timeout,
//!     )
//!     .await?,
//! );
//!
//! let request = BatchRequest {
//!     platform_id: "whatsapp".to_string(),
//!     count: 10,
//!     messages_before: 2,
//!     messages_after: 2,
//!     images: vec![Arc::new(EvidenceImage::from_bytes(std::fs::read("evidence.jpg")?)?)],
//!     conversations: vec![],
//! };
//! let output = run_batch(pool, registry, request, CancelFlag::new()).await?;
//! std::fs::write("screenshots.zip", output.archive)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod error;
pub use error::{Error, JobErrorKind, Result};

pub mod archive;
pub mod batch;
pub mod conversation;
pub mod image;
pub mod pool;
pub mod renderer;
pub mod template;

pub use batch::{
    run_batch, BatchManifest, BatchOutput, BatchRequest, CancelFlag, JobOutcome, JobReport,
    JobStatus, RenderJob, RenderResult,
};
pub use conversation::{ConversationThread, Corpus, Message, MessageWindow, Sender};
pub use image::EvidenceImage;
pub use pool::RenderPool;
pub use renderer::{PageRenderer, RendererFactory};
pub use template::{PlatformTemplate, Scene, TemplateRegistry};

#[cfg(feature = "cdp")]
pub use renderer::{CdpFactory, CdpRenderer};

/// Canvas dimensions a platform template renders at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        // Phone-screen canvas shared by the built-in templates
        Self {
            width: 375,
            height: 812,
        }
    }
}

/// Tuning knobs for the render pool
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrently usable browser contexts
    pub pool_size: usize,
    /// Per-job capture timeout
    pub capture_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get().clamp(1, 8),
            capture_timeout: Duration::from_secs(30),
        }
    }
}
