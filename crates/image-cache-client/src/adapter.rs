//! Per-consumer image lifecycle
//!
//! A [`CacheClientAdapter`] drives one image slot through
//! `Idle -> Loading -> Ready | Failed`, publishing every transition on a
//! watch channel. Each request bumps a generation and gets a fresh
//! cancellation token; a resolution that finishes for an old generation is
//! discarded and its reference revoked.

use crate::local_ref::{ImageSource, LocalReference};
use crate::options::RequestOptions;
use crate::pipeline::FetchPipeline;
use image_blob_cache::{CacheError, ImageCategory};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    /// `attempt` is zero-based; it counts the retries already scheduled
    Loading { attempt: u32 },
    Ready(ImageSource),
    Failed { error: CacheError, fallback: ImageSource },
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    /// Flattened form consumers bind to
    pub fn view(&self) -> ImageView {
        match self {
            LoadState::Idle => ImageView::default(),
            LoadState::Loading { .. } => ImageView {
                is_loading: true,
                ..Default::default()
            },
            LoadState::Ready(source) => ImageView {
                source: Some(source.clone()),
                ..Default::default()
            },
            LoadState::Failed { error, fallback } => ImageView {
                source: Some(fallback.clone()),
                is_loading: false,
                error: Some(error.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageView {
    pub source: Option<ImageSource>,
    pub is_loading: bool,
    pub error: Option<CacheError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    url: String,
    category: ImageCategory,
    options: RequestOptions,
}

impl Target {
    fn fallback(&self) -> ImageSource {
        ImageSource::Remote(
            self.options
                .fallback_url
                .clone()
                .unwrap_or_else(|| self.url.clone()),
        )
    }
}

struct Subscription {
    generation: u64,
    target: Option<Target>,
    token: CancellationToken,
    owned: Vec<LocalReference>,
}

struct Shared {
    pipeline: Arc<FetchPipeline>,
    state: watch::Sender<LoadState>,
    current: Mutex<Subscription>,
}

impl Shared {
    /// Cancel in-flight work and revoke every reference this slot handed out.
    fn supersede(&self, sub: &mut Subscription) -> (u64, CancellationToken) {
        sub.token.cancel();
        for reference in sub.owned.drain(..) {
            self.pipeline.refs().revoke(&reference);
        }
        sub.generation += 1;
        sub.token = CancellationToken::new();
        (sub.generation, sub.token.clone())
    }

    /// Publish `state` if `generation` is still current.
    fn publish(&self, generation: u64, state: LoadState) -> bool {
        let sub = self.current.lock();
        if sub.generation != generation {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn finish_ready(&self, generation: u64, reference: LocalReference) {
        let mut sub = self.current.lock();
        if sub.generation != generation {
            drop(sub);
            self.pipeline.refs().revoke(&reference);
            debug!(handle = %reference.handle(), "Discarding superseded image resolution");
            return;
        }
        sub.owned.push(reference.clone());
        self.state
            .send_replace(LoadState::Ready(ImageSource::Local(reference)));
    }

    fn spawn_warm(self: &Arc<Self>, target: Target) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.pipeline.warm(&target.url, target.category).await {
                warn!(url = %target.url, error = %e, "Image preload failed");
            }
        });
    }
}

async fn run(shared: Arc<Shared>, generation: u64, token: CancellationToken, target: Target) {
    let policy = target.options.retry_policy();
    let mut attempt = 0u32;

    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => return,
            outcome = shared.pipeline.resolve(&target.url, target.category) => outcome,
        };

        match outcome {
            Ok(reference) => {
                shared.finish_ready(generation, reference);
                return;
            }
            Err(e) if policy.should_retry(&e, attempt) => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    url = %target.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Image load failed, retrying"
                );
                if !shared.publish(generation, LoadState::Loading { attempt }) {
                    return;
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "Image load failed, using fallback");
                shared.publish(
                    generation,
                    LoadState::Failed {
                        fallback: target.fallback(),
                        error: e,
                    },
                );
                return;
            }
        }
    }
}

/// Reactive wrapper around [`FetchPipeline`] for one image slot.
///
/// Work is spawned on the current Tokio runtime. Dropping the adapter is the
/// unmount: in-flight work is cancelled and every reference it created is
/// revoked.
pub struct CacheClientAdapter {
    shared: Arc<Shared>,
}

impl CacheClientAdapter {
    pub fn new(pipeline: Arc<FetchPipeline>) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            shared: Arc::new(Shared {
                pipeline,
                state,
                current: Mutex::new(Subscription {
                    generation: 0,
                    target: None,
                    token: CancellationToken::new(),
                    owned: Vec::new(),
                }),
            }),
        }
    }

    /// Point the slot at `url`. `None` (or an empty url) resets to idle.
    ///
    /// Re-requesting the current target is a no-op unless it failed; use
    /// [`retry`](Self::retry) to force a reload.
    pub fn request(&self, url: Option<&str>, category: ImageCategory, options: RequestOptions) {
        let url = url.filter(|u| !u.is_empty());

        if options.preload {
            if let Some(url) = url {
                self.shared.spawn_warm(Target {
                    url: url.to_string(),
                    category,
                    options,
                });
            }
            return;
        }

        let target = url.map(|url| Target {
            url: url.to_string(),
            category,
            options,
        });

        let mut sub = self.shared.current.lock();
        let failed = matches!(*self.shared.state.borrow(), LoadState::Failed { .. });
        if target.is_some() && sub.target == target && !failed {
            return;
        }

        let (generation, token) = self.shared.supersede(&mut sub);
        sub.target = target.clone();

        match target {
            None => {
                self.shared.state.send_replace(LoadState::Idle);
            }
            Some(target) => {
                debug!(url = %target.url, category = %target.category, generation, "Loading image");
                self.shared
                    .state
                    .send_replace(LoadState::Loading { attempt: 0 });
                drop(sub);
                tokio::spawn(run(Arc::clone(&self.shared), generation, token, target));
            }
        }
    }

    /// Reload the current target with a fresh attempt counter.
    pub fn retry(&self) {
        let mut sub = self.shared.current.lock();
        let Some(target) = sub.target.clone() else {
            return;
        };

        let (generation, token) = self.shared.supersede(&mut sub);
        self.shared
            .state
            .send_replace(LoadState::Loading { attempt: 0 });
        drop(sub);

        debug!(url = %target.url, generation, "Retrying image load");
        tokio::spawn(run(Arc::clone(&self.shared), generation, token, target));
    }

    /// Warm the cache for the current target. Errors are logged only.
    pub fn preload_image(&self) {
        let target = self.shared.current.lock().target.clone();
        if let Some(target) = target {
            self.shared.spawn_warm(target);
        }
    }

    pub fn state(&self) -> LoadState {
        self.shared.state.borrow().clone()
    }

    pub fn view(&self) -> ImageView {
        self.shared.state.borrow().view()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.shared.state.subscribe()
    }

    /// Cancel in-flight work, revoke owned references and go idle.
    pub fn close(&self) {
        let mut sub = self.shared.current.lock();
        self.shared.supersede(&mut sub);
        sub.target = None;
        self.shared.state.send_replace(LoadState::Idle);
    }
}

impl Drop for CacheClientAdapter {
    fn drop(&mut self) {
        self.close();
    }
}
