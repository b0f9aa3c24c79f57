//! Renderer backends
//!
//! `PageRenderer` is the seam between the pipeline and whatever actually
//! rasterizes markup. The production backend drives headless Chrome over
//! CDP; tests plug in scripted stand-ins so the pool and orchestrator can
//! be exercised without a browser install.

use crate::error::Result;
use crate::Canvas;

/// A synchronous markup-to-pixels backend.
///
/// One renderer instance is owned by exactly one pool worker thread, so
/// implementations never need internal locking. A renderer must not keep
/// any page state between `capture` calls: each call starts from a fresh
/// document.
pub trait PageRenderer {
    /// Load `markup` in an isolated page, wait for paint-stable (fonts
    /// resolved, images decoded), and return the captured PNG bytes.
    fn capture(&mut self, markup: &str, canvas: Canvas) -> Result<Vec<u8>>;
}

/// Something that can make fresh renderers, used by the pool both at
/// startup and when replacing a crashed context.
///
/// Creation happens on the worker thread itself, so the renderer type does
/// not have to be `Send`.
pub trait RendererFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Box<dyn PageRenderer>>;
}

impl<F> RendererFactory for F
where
    F: Fn() -> Result<Box<dyn PageRenderer>> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Box<dyn PageRenderer>> {
        self()
    }
}

#[cfg(feature = "cdp")]
pub use self::cdp::{CdpFactory, CdpRenderer};

#[cfg(feature = "cdp")]
mod cdp {
    use std::sync::Arc;

    use base64::Engine as Base64Engine;
    use headless_chrome::browser::tab::Tab;
    use headless_chrome::protocol::cdp::Page;
    use headless_chrome::{Browser, LaunchOptions};
    use log::debug;

    use super::{PageRenderer, RendererFactory};
    use crate::error::{Error, Result};
    use crate::Canvas;

    /// Factory the pool uses to launch (and relaunch) CDP renderers
    pub struct CdpFactory {
        canvas: Canvas,
    }

    impl CdpFactory {
        pub fn new(canvas: Canvas) -> Self {
            Self { canvas }
        }
    }

    impl RendererFactory for CdpFactory {
        fn create(&self) -> Result<Box<dyn PageRenderer>> {
            Ok(Box::new(CdpRenderer::new(self.canvas)?))
        }
    }

    /// Script evaluated (promise-awaited) before capture: resolves once
    /// fonts are loaded and every inline image has decoded.
    const PAINT_STABLE_SCRIPT: &str = r#"
        (async function() {
            await document.fonts.ready;
            await Promise.all(
                Array.from(document.images).map(function(img) {
                    return img.decode().catch(function() {});
                })
            );
            return true;
        })()
    "#;

    /// CDP-backed renderer: one headless Chrome instance with one tab.
    ///
    /// Each `capture` navigates the tab to a fresh `data:` URL, so no DOM
    /// or storage survives between jobs. The browser is torn down on drop;
    /// the pool discards the whole renderer when it misbehaves.
    pub struct CdpRenderer {
        _browser: Browser,
        tab: Arc<Tab>,
    }

    impl CdpRenderer {
        pub fn new(canvas: Canvas) -> Result<Self> {
            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .window_size(Some((canvas.width, canvas.height)))
                .build()
                .map_err(|e| {
                    Error::BrowserCrash(format!("failed to build launch options: {}", e))
                })?;

            let browser = Browser::new(launch_options)
                .map_err(|e| Error::BrowserCrash(format!("failed to launch browser: {}", e)))?;

            let tab = browser
                .new_tab()
                .map_err(|e| Error::BrowserCrash(format!("failed to create tab: {}", e)))?;

            Ok(Self {
                _browser: browser,
                tab,
            })
        }
    }

    impl PageRenderer for CdpRenderer {
        fn capture(&mut self, markup: &str, canvas: Canvas) -> Result<Vec<u8>> {
            // data: URL navigation keeps the document self-contained; the
            // markup embeds its image as a data URI, so nothing is fetched.
            let encoded = base64::engine::general_purpose::STANDARD.encode(markup);
            let url = format!("data:text/html;base64,{}", encoded);

            self.tab
                .navigate_to(&url)
                .map_err(|e| Error::BrowserCrash(format!("navigation failed: {}", e)))?;
            self.tab
                .wait_until_navigated()
                .map_err(|e| Error::BrowserCrash(format!("navigation wait failed: {}", e)))?;

            self.tab
                .evaluate(PAINT_STABLE_SCRIPT, true)
                .map_err(|e| Error::BrowserCrash(format!("paint-stable wait failed: {}", e)))?;

            let clip = Page::Viewport {
                x: 0.0,
                y: 0.0,
                width: canvas.width as f64,
                height: canvas.height as f64,
                scale: 1.0,
            };
            let png = self
                .tab
                .capture_screenshot(
                    Page::CaptureScreenshotFormatOption::Png,
                    None,
                    Some(clip),
                    true,
                )
                .map_err(|e| Error::BrowserCrash(format!("screenshot failed: {}", e)))?;

            debug!("captured {} bytes at {}x{}", png.len(), canvas.width, canvas.height);
            Ok(png)
        }
    }
}
