use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use image::DynamicImage;
use rand::Rng;
use tracing::warn;

use crate::api::{encode_png_base64, ImageService};
use crate::config::AppConfig;
use crate::frames::FrameStore;

/// How long the worker waits on the queue before re-checking the stop flag.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// The three live prompt strings the UI edits while the worker runs.
///
/// Reads are best-effort at the moment a task is dequeued: an in-flight
/// generation keeps whatever text it was built with.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub main: String,
    pub morph: String,
    pub negative: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        PromptSet {
            main: "A portrait of an anime character".into(),
            morph: "A colorful abstract pattern".into(),
            negative: "distorted, ugly, blurry".into(),
        }
    }
}

impl PromptSet {
    /// Positive prompt as sent to the service: subject first, morph after.
    pub fn combined(&self) -> String {
        format!("{}, {}", self.main, self.morph)
    }
}

pub type SharedPrompts = Arc<Mutex<PromptSet>>;

/// One successfully generated frame, reported back to the UI.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Frame {
        index: u32,
        path: PathBuf,
        image: DynamicImage,
    },
}

/// A cancellable morph session: one worker thread consuming a queue of seed
/// images.
///
/// Each dequeued seed goes through img2img. For continuity the previous
/// successful output is preferred as the init image (at `morph_strength`);
/// only the very first frame of a session starts from the raw seed (at
/// `first_frame_strength`). Successes are saved as numbered frames and
/// reported through the event channel.
///
/// `cancel` stops the loop and discards anything still queued. An in-flight
/// HTTP call is never interrupted; cancellation only prevents further
/// dequeues.
pub struct MorphWorker {
    tasks: Sender<DynamicImage>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MorphWorker {
    pub fn spawn<S: ImageService + 'static>(
        service: S,
        prompts: SharedPrompts,
        store: FrameStore,
        config: AppConfig,
        seed: Option<DynamicImage>,
    ) -> (Self, Receiver<WorkerEvent>) {
        let (task_tx, task_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            worker_loop(
                service, prompts, store, config, seed, task_rx, event_tx, stop_flag,
            );
        });

        (
            MorphWorker {
                tasks: task_tx,
                stop,
                handle,
            },
            event_rx,
        )
    }

    /// Queue one seed image for processing.
    pub fn enqueue(&self, seed: DynamicImage) {
        // Send only fails if the worker thread died; the session is over
        // either way, so there is nothing useful to do with the error.
        let _ = self.tasks.send(seed);
    }

    /// Stop the worker and discard queued work.
    ///
    /// Returns immediately so a UI thread can pause without stalling: an
    /// in-flight generation is never interrupted, and the returned handle
    /// only completes once that call (if any) has finished and its frame
    /// event has been delivered. The caller decides when to join.
    pub fn cancel(self) -> JoinHandle<()> {
        self.stop.store(true, Ordering::SeqCst);
        drop(self.tasks);
        self.handle
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop<S: ImageService>(
    service: S,
    prompts: SharedPrompts,
    mut store: FrameStore,
    config: AppConfig,
    mut previous: Option<DynamicImage>,
    tasks: Receiver<DynamicImage>,
    events: Sender<WorkerEvent>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let seed = match tasks.recv_timeout(DEQUEUE_TIMEOUT) {
            Ok(seed) => seed,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let (init, strength) = match previous.as_ref() {
            Some(prev) => (prev, config.morph_strength),
            None => (&seed, config.first_frame_strength),
        };

        let init_image = match encode_png_base64(init) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("could not encode seed image: {e}");
                continue;
            }
        };

        let request = {
            let prompts = prompts.lock().unwrap();
            config.img2img_request(
                init_image,
                prompts.combined(),
                prompts.negative.clone(),
                strength,
                config.interactive_steps,
            )
        };

        // Absent result: the adapter already logged it, leave the slot unfilled
        let Some(image) = service.img2img(&request) else {
            continue;
        };

        previous = Some(image.clone());
        match store.save(&image) {
            Ok(path) => {
                let _ = events.send(WorkerEvent::Frame {
                    index: store.next_index() - 1,
                    path,
                    image,
                });
            }
            Err(e) => warn!("could not save generated frame: {e}"),
        }
    }

    // Drain-on-cancel: whatever is still queued is deliberately dropped.
    while tasks.try_recv().is_ok() {}
}

/// Uniform random RGB noise, the seed material for the morph loop.
pub fn random_seed_image(width: u32, height: u32) -> DynamicImage {
    let mut rng = rand::thread_rng();
    let mut image = image::RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = image::Rgb([rng.gen(), rng.gen(), rng.gen()]);
    }
    DynamicImage::ImageRgb8(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Img2ImgRequest, Txt2ImgRequest};
    use std::sync::atomic::AtomicU32;

    /// Stub service: counts calls, optionally sleeps to simulate a slow
    /// generation, and remembers the last prompt it saw.
    struct StubService {
        calls: Arc<AtomicU32>,
        delay: Duration,
        last_prompt: Arc<Mutex<String>>,
    }

    impl StubService {
        fn new(delay: Duration) -> Self {
            StubService {
                calls: Arc::new(AtomicU32::new(0)),
                delay,
                last_prompt: Arc::new(Mutex::new(String::new())),
            }
        }
    }

    impl ImageService for StubService {
        fn txt2img(&self, _request: &Txt2ImgRequest) -> Option<DynamicImage> {
            None
        }

        fn img2img(&self, request: &Img2ImgRequest) -> Option<DynamicImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = request.prompt.clone();
            std::thread::sleep(self.delay);
            Some(DynamicImage::ImageRgba8(image::RgbaImage::new(8, 8)))
        }
    }

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.width = 8;
        config.height = 8;
        config
    }

    fn spawn_worker(
        service: StubService,
        dir: &std::path::Path,
        prompts: SharedPrompts,
        seed: Option<DynamicImage>,
    ) -> (MorphWorker, Receiver<WorkerEvent>) {
        let store = FrameStore::open(dir).unwrap();
        MorphWorker::spawn(service, prompts, store, small_config(), seed)
    }

    #[test]
    fn random_seed_image_has_requested_dimensions() {
        let image = random_seed_image(512, 480);
        assert_eq!(image.width(), 512);
        assert_eq!(image.height(), 480);
    }

    #[test]
    fn processes_queued_seeds_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::new(Duration::ZERO);
        let prompts = SharedPrompts::default();
        let (worker, events) = spawn_worker(service, dir.path(), prompts, None);

        worker.enqueue(random_seed_image(8, 8));
        worker.enqueue(random_seed_image(8, 8));

        let timeout = Duration::from_secs(5);
        for expected in 0..2u32 {
            let WorkerEvent::Frame { index, path, .. } = events.recv_timeout(timeout).unwrap();
            assert_eq!(index, expected);
            assert!(path.exists());
        }

        worker.cancel().join().unwrap();
    }

    #[test]
    fn cancel_discards_queued_work() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::new(Duration::from_millis(200));
        let calls = Arc::clone(&service.calls);
        let prompts = SharedPrompts::default();
        let (worker, events) = spawn_worker(service, dir.path(), prompts, None);

        for _ in 0..6 {
            worker.enqueue(random_seed_image(8, 8));
        }

        // Wait for the first frame so we know the worker is mid-queue
        events.recv_timeout(Duration::from_secs(5)).unwrap();
        worker.cancel().join().unwrap();

        // Most of the queue must have been discarded, not processed
        assert!(calls.load(Ordering::SeqCst) < 6);
        // And nothing runs once the worker has wound down
        let settled = calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(calls.load(Ordering::SeqCst), settled);
    }

    /// Poll a condition instead of sleeping a fixed amount.
    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                std::time::Instant::now() < deadline,
                "condition not met in time"
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn cancel_returns_without_waiting_for_the_inflight_call() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::new(Duration::from_secs(2));
        let calls = Arc::clone(&service.calls);
        let (worker, _events) =
            spawn_worker(service, dir.path(), SharedPrompts::default(), None);

        worker.enqueue(random_seed_image(8, 8));
        wait_until(|| calls.load(Ordering::SeqCst) == 1);

        // The generation is running right now; cancelling must not block on it
        let started = std::time::Instant::now();
        let handle = worker.cancel();
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "cancel waited for the in-flight generation"
        );

        handle.join().unwrap();
    }

    #[test]
    fn inflight_frame_event_is_delivered_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::new(Duration::from_millis(300));
        let calls = Arc::clone(&service.calls);
        let (worker, events) =
            spawn_worker(service, dir.path(), SharedPrompts::default(), None);

        worker.enqueue(random_seed_image(8, 8));
        wait_until(|| calls.load(Ordering::SeqCst) == 1);

        worker.cancel().join().unwrap();

        // The frame that was mid-generation when we cancelled still lands,
        // saved and reported, so a resume can seed continuity from it
        let WorkerEvent::Frame { index, path, .. } =
            events.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(index, 0);
        assert!(path.exists());
    }

    #[test]
    fn respawn_continues_numbering_and_carries_the_seed() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = SharedPrompts::default();

        let (worker, events) = spawn_worker(
            StubService::new(Duration::ZERO),
            dir.path(),
            Arc::clone(&prompts),
            None,
        );
        worker.enqueue(random_seed_image(8, 8));
        let WorkerEvent::Frame { index, image, .. } =
            events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(index, 0);
        worker.cancel().join().unwrap();

        // Resume: a fresh worker over the same directory, seeded by the
        // last output, picks up at the next frame number.
        let (worker, events) =
            spawn_worker(StubService::new(Duration::ZERO), dir.path(), prompts, Some(image));
        worker.enqueue(random_seed_image(8, 8));
        let WorkerEvent::Frame { index, .. } =
            events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(index, 1);
        worker.cancel().join().unwrap();
    }

    #[test]
    fn prompt_edits_apply_to_later_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let service = StubService::new(Duration::ZERO);
        let last_prompt = Arc::clone(&service.last_prompt);
        let prompts = SharedPrompts::default();
        let (worker, events) = spawn_worker(service, dir.path(), Arc::clone(&prompts), None);

        worker.enqueue(random_seed_image(8, 8));
        events.recv_timeout(Duration::from_secs(5)).unwrap();

        prompts.lock().unwrap().main = "a lighthouse in a storm".into();
        worker.enqueue(random_seed_image(8, 8));
        events.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(last_prompt.lock().unwrap().contains("a lighthouse in a storm"));
        worker.cancel().join().unwrap();
    }
}
