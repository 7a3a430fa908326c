use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use iced::widget::{button, column, container, row, text, text_input, Image};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};
use image::DynamicImage;
use rfd::FileDialog;
use tracing::error;

use super::worker::{random_seed_image, MorphWorker, PromptSet, SharedPrompts, WorkerEvent};
use crate::api::SdClient;
use crate::config::AppConfig;
use crate::frames::FrameStore;

/// A running worker plus the channel its frames arrive on.
struct ActiveSession {
    worker: MorphWorker,
    events: Receiver<WorkerEvent>,
}

/// A cancelled worker that may still be finishing one generation.
///
/// Cancelling never interrupts an in-flight HTTP call, so the thread can
/// outlive the pause press by however long that call takes. Keeping the
/// event channel open until the thread is reaped means the frame it was
/// working on still reaches the display and the continuity seed.
struct FinishingSession {
    events: Receiver<WorkerEvent>,
    handle: JoinHandle<()>,
}

/// Main application state for the live morph window.
pub struct MorphApp {
    config: AppConfig,
    /// Shared with the worker; edits apply to the next dequeued task
    prompts: SharedPrompts,
    /// Local copies backing the text inputs
    main_prompt: String,
    morph_prompt: String,
    negative_prompt: String,
    session: Option<ActiveSession>,
    /// Cancelled worker still winding down its last generation, if any
    finishing: Option<FinishingSession>,
    /// Most recent frame, ready for display
    display: Option<iced::widget::image::Handle>,
    /// Most recent frame as pixels, the continuity seed across pauses
    last_image: Option<DynamicImage>,
    frames_done: u32,
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    MainPromptChanged(String),
    MorphPromptChanged(String),
    NegativePromptChanged(String),
    /// Pause a running session (discarding queued work) or resume a paused one
    TogglePause,
    PickOutputFolder,
    /// Once a second: enqueue one seed and collect finished frames
    Tick,
}

impl MorphApp {
    pub fn new() -> (Self, Task<Message>) {
        let config = AppConfig::load();
        let prompts = PromptSet::default();

        let mut app = MorphApp {
            config,
            main_prompt: prompts.main.clone(),
            morph_prompt: prompts.morph.clone(),
            negative_prompt: prompts.negative.clone(),
            prompts: Arc::new(Mutex::new(prompts)),
            session: None,
            finishing: None,
            display: None,
            last_image: None,
            frames_done: 0,
            status: String::new(),
        };

        // Start generating right away, like flipping the window open mid-stream
        app.start_session();

        (app, Task::none())
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::MainPromptChanged(value) => {
                self.prompts.lock().unwrap().main = value.clone();
                self.main_prompt = value;
            }
            Message::MorphPromptChanged(value) => {
                self.prompts.lock().unwrap().morph = value.clone();
                self.morph_prompt = value;
            }
            Message::NegativePromptChanged(value) => {
                self.prompts.lock().unwrap().negative = value.clone();
                self.negative_prompt = value;
            }
            Message::TogglePause => {
                if let Some(ActiveSession { worker, events }) = self.session.take() {
                    // Stop is immediate; the thread winds down in the
                    // background so an in-flight call cannot stall the UI
                    self.finishing = Some(FinishingSession {
                        events,
                        handle: worker.cancel(),
                    });
                    self.status = "Paused. Queued work discarded.".into();
                } else {
                    self.settle_finished_session();
                    if self.finishing.is_some() {
                        self.status =
                            "Still finishing the last generation; try again in a moment.".into();
                    } else {
                        self.start_session();
                    }
                }
            }
            Message::PickOutputFolder => {
                let folder = FileDialog::new()
                    .set_title("Select Frame Output Folder")
                    .pick_folder();

                if let Some(folder) = folder {
                    self.config.output_dir = folder;
                    if let Err(e) = self.config.save() {
                        error!("could not persist config: {e}");
                    }
                    self.status = format!(
                        "Saving frames to {} from the next resume on.",
                        self.config.output_dir.display()
                    );
                }
            }
            Message::Tick => {
                self.settle_finished_session();

                if let Some(session) = &self.session {
                    session
                        .worker
                        .enqueue(random_seed_image(self.config.width, self.config.height));
                }
                self.drain_session_events();
            }
        }

        Task::none()
    }

    pub fn view(&self) -> Element<Message> {
        let running = self.session.is_some();

        let prompt_field = |label, value: &str, on_input: fn(String) -> Message| {
            column![
                text(label).size(14),
                text_input("", value).on_input(on_input).padding(8),
            ]
            .spacing(4)
        };

        let controls = row![
            button(text(if running { "Pause" } else { "Resume" }))
                .on_press(Message::TogglePause)
                .padding(10),
            button(text("Output Folder..."))
                .on_press(Message::PickOutputFolder)
                .padding(10),
        ]
        .spacing(12);

        let frame: Element<Message> = match &self.display {
            Some(handle) => Image::new(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => container(text("Waiting for the first frame..."))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        let content = column![
            prompt_field("Main Prompt", &self.main_prompt, Message::MainPromptChanged),
            prompt_field("Morph Prompt", &self.morph_prompt, Message::MorphPromptChanged),
            prompt_field(
                "Negative Prompt",
                &self.negative_prompt,
                Message::NegativePromptChanged
            ),
            controls,
            frame,
            row![
                text(format!("Frames: {}", self.frames_done)).size(14),
                text(&self.status).size(14),
            ]
            .spacing(16),
        ]
        .spacing(12)
        .padding(16)
        .align_x(Alignment::Center);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        iced::time::every(Duration::from_secs(1)).map(|_| Message::Tick)
    }

    pub fn theme(&self) -> Theme {
        Theme::Dark
    }

    /// Spawn a fresh worker over the configured output directory, seeded
    /// with the last generated image so the morph continues where it
    /// stopped. Frame numbering resumes past whatever is already on disk.
    fn start_session(&mut self) {
        let store = match FrameStore::open(&self.config.output_dir) {
            Ok(store) => store,
            Err(e) => {
                error!("could not open frame directory: {e}");
                self.status = format!(
                    "Cannot write to {}: {e}",
                    self.config.output_dir.display()
                );
                return;
            }
        };

        let client = SdClient::new(&self.config.api_base_url);
        let (worker, events) = MorphWorker::spawn(
            client,
            Arc::clone(&self.prompts),
            store,
            self.config.clone(),
            self.last_image.clone(),
        );

        self.session = Some(ActiveSession { worker, events });
        self.status = format!(
            "Running. Frames go to {}.",
            self.config.output_dir.display()
        );
    }

    /// Apply one generated frame to the display state. The image doubles as
    /// the continuity seed for the next session.
    fn apply_frame(&mut self, event: WorkerEvent) {
        let WorkerEvent::Frame { index, image, .. } = event;
        self.display = Some(to_handle(&image));
        self.last_image = Some(image);
        self.frames_done = index + 1;
        self.status = format!("Frame {index} generated.");
    }

    fn drain_session_events(&mut self) {
        let mut frames = Vec::new();
        if let Some(session) = &self.session {
            while let Ok(event) = session.events.try_recv() {
                frames.push(event);
            }
        }
        for event in frames {
            self.apply_frame(event);
        }
    }

    /// Collect whatever a cancelled worker produced on its way out, and reap
    /// the thread once it is done.
    fn settle_finished_session(&mut self) {
        let Some(FinishingSession { events, handle }) = self.finishing.take() else {
            return;
        };

        while let Ok(event) = events.try_recv() {
            self.apply_frame(event);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                error!("morph worker thread panicked");
            }
            // the final frame may have landed between the drain and the join
            while let Ok(event) = events.try_recv() {
                self.apply_frame(event);
            }
        } else {
            self.finishing = Some(FinishingSession { events, handle });
        }
    }
}

fn to_handle(image: &DynamicImage) -> iced::widget::image::Handle {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    iced::widget::image::Handle::from_rgba(width, height, rgba.into_raw())
}
