//! Fit-to-width image sizing.
//!
//! Given an image and a target width, produce the display height that keeps
//! the aspect ratio. Natural sizes are cached per image, so any width is
//! answered synchronously once the image has been probed; otherwise a
//! placeholder is returned and the size is read on a background thread.
//! Every changed request bumps a sequence number; a probe issued before the
//! current source was requested is stale and never touches the height.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};

use crate::state::{ImageUri, Size};

/// Height shown before the first probe completes. Non-zero to avoid a
/// collapsed layout.
pub const DEFAULT_HEIGHT: f32 = 200.0;

/// Reads the natural size of an image.
pub trait SizeProbe: Send + Sync {
    fn natural_size(&self, uri: &ImageUri) -> anyhow::Result<Size>;
}

/// Header probe for local files; remote images are fetched and sniffed in memory.
pub struct HeaderProbe {
    client: reqwest::blocking::Client,
}

impl HeaderProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HeaderProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeProbe for HeaderProbe {
    fn natural_size(&self, uri: &ImageUri) -> anyhow::Result<Size> {
        if let Some(path) = uri.local_path() {
            return crate::decode::natural_size(path);
        }
        let bytes = self
            .client
            .get(uri.as_str())
            .send()?
            .error_for_status()?
            .bytes()?;
        crate::decode::natural_size_from_bytes(&bytes)
    }
}

/// Aspect-correct height for `width`, capped at `max_height`.
pub fn fit_width(natural: Size, width: f32, max_height: Option<f32>) -> f32 {
    let height = if natural.width == 0 {
        0.0
    } else {
        width * natural.height as f32 / natural.width as f32
    };
    match max_height {
        Some(max) if height > max => max,
        _ => height,
    }
}

#[derive(Debug, Default)]
/// Display heights by image and width, stored as one natural size per image.
pub struct SizeCache {
    sizes: HashMap<ImageUri, Size>,
}

impl SizeCache {
    pub fn get(&self, uri: &ImageUri, width: f32, max_height: Option<f32>) -> Option<f32> {
        self.sizes
            .get(uri)
            .map(|&natural| fit_width(natural, width, max_height))
    }

    pub fn insert(&mut self, uri: &ImageUri, natural: Size) {
        self.sizes.insert(uri.clone(), natural);
    }
}

pub type SharedSizeCache = Arc<Mutex<SizeCache>>;

#[derive(Debug)]
/// A finished probe, tagged with the sequence number it was issued under.
pub struct ProbeResult {
    pub sequence: u64,
    pub uri: ImageUri,
    pub natural: Result<Size, String>,
}

type HeightCallback = Box<dyn FnMut(f32)>;
type ErrorCallback = Box<dyn FnMut(&str)>;

/// Display-height state for one image view.
pub struct AutoSizeImage {
    source: Option<ImageUri>,
    width: f32,
    max_height: Option<f32>,
    height: f32,
    sequence: u64,
    /// Sequence at which the current source was first requested.
    source_since: u64,
    /// Newest probe sequence still running, per image.
    pending: HashMap<ImageUri, u64>,
    cache: SharedSizeCache,
    probe: Arc<dyn SizeProbe>,
    tx: mpsc::Sender<ProbeResult>,
    rx: mpsc::Receiver<ProbeResult>,
    repaint: Option<egui::Context>,
    on_height_change: Option<HeightCallback>,
    on_error: Option<ErrorCallback>,
}

impl AutoSizeImage {
    pub fn new(cache: SharedSizeCache, probe: Arc<dyn SizeProbe>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source: None,
            width: 0.0,
            max_height: None,
            height: DEFAULT_HEIGHT,
            sequence: 0,
            source_since: 0,
            pending: HashMap::new(),
            cache,
            probe,
            tx,
            rx,
            repaint: None,
            on_height_change: None,
            on_error: None,
        }
    }

    pub fn with_repaint(mut self, ctx: egui::Context) -> Self {
        self.repaint = Some(ctx);
        self
    }

    pub fn on_height_change(mut self, f: impl FnMut(f32) + 'static) -> Self {
        self.on_height_change = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Display height for `source` at `width`.
    ///
    /// Unchanged inputs return the current height. A cached natural size is
    /// fitted immediately; otherwise the height falls back to
    /// [`DEFAULT_HEIGHT`] and a probe is started unless one issued for the
    /// current source is already running.
    pub fn request(&mut self, source: &ImageUri, width: f32, max_height: Option<f32>) -> f32 {
        let same_source = self.source.as_ref() == Some(source);
        if same_source && self.width == width && self.max_height == max_height {
            return self.height;
        }

        self.sequence += 1;
        if !same_source {
            self.source_since = self.sequence;
        }
        self.source = Some(source.clone());
        self.width = width;
        self.max_height = max_height;

        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(source, width, max_height));
        match cached {
            Some(height) => self.set_height(height),
            None => {
                if !same_source {
                    self.height = DEFAULT_HEIGHT;
                }
                let running = self
                    .pending
                    .get(source)
                    .is_some_and(|&seq| seq >= self.source_since);
                if !running {
                    self.pending.insert(source.clone(), self.sequence);
                    self.spawn_probe(source.clone());
                }
            }
        }
        self.height
    }

    fn spawn_probe(&self, uri: ImageUri) {
        let sequence = self.sequence;
        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let repaint = self.repaint.clone();
        tracing::debug!(%uri, sequence, "probing natural size");
        std::thread::spawn(move || {
            let natural = probe.natural_size(&uri).map_err(|err| format!("{err:#}"));
            let _ = tx.send(ProbeResult {
                sequence,
                uri,
                natural,
            });
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        });
    }

    /// Drain finished probes. Returns the new height if it changed.
    pub fn poll(&mut self) -> Option<f32> {
        let mut changed = None;
        while let Ok(result) = self.rx.try_recv() {
            if let Some(height) = self.apply(result) {
                changed = Some(height);
            }
        }
        changed
    }

    /// Apply one probe result. Stale sequences only feed the cache.
    pub fn apply(&mut self, result: ProbeResult) -> Option<f32> {
        if self.pending.get(&result.uri) == Some(&result.sequence) {
            self.pending.remove(&result.uri);
        }
        let current = result.sequence >= self.source_since
            && self.source.as_ref() == Some(&result.uri);

        let natural = match result.natural {
            Ok(natural) => natural,
            Err(err) => {
                if current {
                    tracing::warn!(uri = %result.uri, %err, "size probe failed");
                    if let Some(on_error) = self.on_error.as_mut() {
                        on_error(&err);
                    }
                }
                return None;
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(&result.uri, natural);
        }
        if !current {
            tracing::debug!(
                stale = result.sequence,
                latest = self.sequence,
                "discarding stale size result"
            );
            return None;
        }

        // Fitted against the latest request, not the one that started the probe.
        let height = fit_width(natural, self.width, self.max_height);
        self.set_height(height);
        Some(height)
    }

    fn set_height(&mut self, height: f32) {
        self.height = height;
        if let Some(cb) = self.on_height_change.as_mut() {
            cb(height);
        }
    }

    #[cfg(test)]
    fn wait(&mut self, timeout: std::time::Duration) -> Option<f32> {
        let result = self.rx.recv_timeout(timeout).ok()?;
        self.apply(result)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;

    struct FixedProbe(Result<Size, &'static str>);

    impl SizeProbe for FixedProbe {
        fn natural_size(&self, _uri: &ImageUri) -> anyhow::Result<Size> {
            match &self.0 {
                Ok(size) => Ok(*size),
                Err(msg) => anyhow::bail!("{msg}"),
            }
        }
    }

    fn image(probe: FixedProbe) -> AutoSizeImage {
        AutoSizeImage::new(SharedSizeCache::default(), Arc::new(probe))
    }

    fn result(sequence: u64, uri: &str, natural: Size) -> ProbeResult {
        ProbeResult {
            sequence,
            uri: ImageUri::from(uri),
            natural: Ok(natural),
        }
    }

    #[test]
    fn fit_width_preserves_aspect_and_respects_cap() {
        assert_eq!(fit_width(Size::new(1080, 1920), 360.0, None), 640.0);
        assert_eq!(fit_width(Size::new(1080, 1920), 360.0, Some(500.0)), 500.0);
        assert_eq!(fit_width(Size::new(2000, 1000), 360.0, Some(500.0)), 180.0);
    }

    #[test]
    fn cache_miss_returns_default_then_size_read_sets_height() {
        let mut img = image(FixedProbe(Ok(Size::new(1000, 500))));
        let uri = ImageUri::from("/a.png");
        assert_eq!(img.request(&uri, 400.0, None), DEFAULT_HEIGHT);

        assert_eq!(img.wait(Duration::from_secs(5)), Some(200.0));
        assert_eq!(img.height, 200.0);
        assert!(img.pending.is_empty());
    }

    #[test]
    fn cached_natural_size_answers_any_width() {
        let cache = SharedSizeCache::default();
        let uri = ImageUri::from("/a.png");
        cache.lock().unwrap().insert(&uri, Size::new(400, 300));

        let mut img = AutoSizeImage::new(cache, Arc::new(FixedProbe(Err("unused"))));
        assert_eq!(img.request(&uri, 400.0, None), 300.0);
        assert_eq!(img.request(&uri, 200.0, None), 150.0);
        assert_eq!(img.request(&uri, 800.0, Some(500.0)), 500.0);
        assert!(img.pending.is_empty());
    }

    #[test]
    fn stale_size_read_never_overwrites_newer_height() {
        let mut img = image(FixedProbe(Err("not used")));
        img.sequence = 2;
        img.source_since = 2;
        img.source = Some(ImageUri::from("/b.png"));
        img.width = 360.0;

        assert_eq!(img.apply(result(2, "/b.png", Size::new(360, 720))), Some(720.0));
        assert_eq!(img.apply(result(1, "/a.png", Size::new(360, 100))), None);
        assert_eq!(img.height, 720.0);
        // The stale answer is still worth caching for its own source.
        let cached = img
            .cache
            .lock()
            .unwrap()
            .get(&ImageUri::from("/a.png"), 360.0, None);
        assert_eq!(cached, Some(100.0));
    }

    #[test]
    fn size_read_from_before_source_switch_is_stale_even_for_same_image() {
        let mut img = image(FixedProbe(Err("not used")));
        img.sequence = 3;
        img.source_since = 3;
        img.source = Some(ImageUri::from("/a.png"));
        img.width = 360.0;

        assert_eq!(img.apply(result(1, "/a.png", Size::new(360, 100))), None);
        assert_eq!(img.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn new_source_supersedes_in_flight_size_read() {
        let mut img = image(FixedProbe(Ok(Size::new(100, 100))));
        img.request(&ImageUri::from("/a.png"), 360.0, None);
        img.request(&ImageUri::from("/b.png"), 360.0, None);
        assert_eq!(img.sequence, 2);

        let mut applied = Vec::new();
        for _ in 0..2 {
            let result = img.rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let uri = result.uri.clone();
            if img.apply(result).is_some() {
                applied.push(uri);
            }
        }
        assert_eq!(applied, vec![ImageUri::from("/b.png")]);
    }

    #[test]
    fn resizing_during_size_read_reuses_it_and_fits_latest_width() {
        let mut img = image(FixedProbe(Ok(Size::new(200, 100))));
        let uri = ImageUri::from("/a.png");
        for width in [300.0, 310.0, 320.0, 400.0] {
            assert_eq!(img.request(&uri, width, None), DEFAULT_HEIGHT);
        }
        assert_eq!(img.pending.len(), 1);

        assert_eq!(img.wait(Duration::from_secs(5)), Some(200.0));
        assert!(img.rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(img.cache.lock().unwrap().sizes.len(), 1);
    }

    #[test]
    fn size_read_failure_reports_error_and_keeps_height() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let mut img = image(FixedProbe(Err("unreadable header")))
            .on_error(move |err| sink.borrow_mut().push(err.to_string()));

        let uri = ImageUri::from("/broken.png");
        img.request(&uri, 300.0, None);
        assert_eq!(img.wait(Duration::from_secs(5)), None);

        assert_eq!(img.height, DEFAULT_HEIGHT);
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].contains("unreadable header"));
    }

    #[test]
    fn height_change_callback_fires_on_apply() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut img =
            image(FixedProbe(Err("unused"))).on_height_change(move |h| sink.borrow_mut().push(h));
        img.sequence = 1;
        img.source_since = 1;
        img.source = Some(ImageUri::from("/a.png"));
        img.width = 360.0;
        img.apply(result(1, "/a.png", Size::new(360, 90)));
        assert_eq!(*seen.borrow(), vec![90.0]);
    }

    #[test]
    fn unchanged_request_does_not_reread_size() {
        let mut img = image(FixedProbe(Ok(Size::new(10, 10))));
        let uri = ImageUri::from("/a.png");
        img.request(&uri, 50.0, None);
        img.request(&uri, 50.0, None);
        assert_eq!(img.sequence, 1);
        assert_eq!(img.pending.len(), 1);
        assert_eq!(img.wait(Duration::from_secs(5)), Some(50.0));
        assert!(img.rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
