use std::path::PathBuf;

use image::DynamicImage;
use tracing::{info, warn};

use crate::api::{encode_png_base64, ImageService};
use crate::config::AppConfig;
use crate::frames::FrameStore;

/// Produce a frame sequence by repeatedly feeding each generated image back
/// through img2img.
///
/// The starting point is either `seed` (an image the caller already has on
/// disk, used as-is and not re-saved) or a fresh txt2img generation. Each
/// successful evolve step is saved as the next numbered frame; the first
/// absent result stops the run quietly and whatever was produced so far
/// stands. Returns the paths of the frames saved by this run, in order.
pub fn run_sequence<S: ImageService>(
    service: &S,
    store: &mut FrameStore,
    config: &AppConfig,
    evolve_steps: u32,
    seed: Option<DynamicImage>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let mut current = match seed {
        Some(image) => {
            info!("reusing supplied initial image");
            image
        }
        None => {
            let request = config.txt2img_request(&config.prompt, &config.negative_prompt);
            match service.txt2img(&request) {
                Some(image) => match store.save(&image) {
                    Ok(path) => {
                        info!("initial frame saved to {}", path.display());
                        paths.push(path);
                        image
                    }
                    Err(e) => {
                        warn!("could not save initial frame: {e}");
                        return paths;
                    }
                },
                None => {
                    warn!("initial generation failed; no frames produced");
                    return paths;
                }
            }
        }
    };

    for step in 1..=evolve_steps {
        let init_image = match encode_png_base64(&current) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("could not encode seed for step {step}: {e}");
                break;
            }
        };

        let request = config.img2img_request(
            init_image,
            evolve_prompt(&config.evolve_prompt, step),
            config.negative_prompt.clone(),
            config.denoising_strength,
            config.steps,
        );

        let Some(evolved) = service.img2img(&request) else {
            warn!("evolve step {step} failed; stopping after {} frames", paths.len());
            break;
        };

        match store.save(&evolved) {
            Ok(path) => {
                info!("frame {step}/{evolve_steps} saved to {}", path.display());
                paths.push(path);
                current = evolved;
            }
            Err(e) => {
                warn!("could not save frame for step {step}: {e}");
                break;
            }
        }
    }

    paths
}

/// Per-step prompt: the base evolve prompt annotated with the step number,
/// which nudges the model to keep the sequence progressing.
pub fn evolve_prompt(base: &str, step: u32) -> String {
    format!("{base}, step {step}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Img2ImgRequest, Txt2ImgRequest};
    use std::cell::Cell;

    /// Service stub that succeeds a fixed number of times, then fails.
    struct CountedService {
        budget: Cell<u32>,
        txt2img_calls: Cell<u32>,
        img2img_calls: Cell<u32>,
    }

    impl CountedService {
        fn with_budget(budget: u32) -> Self {
            CountedService {
                budget: Cell::new(budget),
                txt2img_calls: Cell::new(0),
                img2img_calls: Cell::new(0),
            }
        }

        fn take_one(&self) -> Option<DynamicImage> {
            if self.budget.get() == 0 {
                return None;
            }
            self.budget.set(self.budget.get() - 1);
            Some(DynamicImage::ImageRgba8(image::RgbaImage::new(4, 4)))
        }
    }

    impl ImageService for CountedService {
        fn txt2img(&self, _request: &Txt2ImgRequest) -> Option<DynamicImage> {
            self.txt2img_calls.set(self.txt2img_calls.get() + 1);
            self.take_one()
        }

        fn img2img(&self, _request: &Img2ImgRequest) -> Option<DynamicImage> {
            self.img2img_calls.set(self.img2img_calls.get() + 1);
            self.take_one()
        }
    }

    fn store() -> (tempfile::TempDir, FrameStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn full_run_produces_initial_plus_evolved_frames() {
        let (_dir, mut store) = store();
        let service = CountedService::with_budget(10);

        let paths = run_sequence(&service, &mut store, &AppConfig::default(), 3, None);

        assert_eq!(paths.len(), 4); // 1 initial + 3 evolved
        assert_eq!(service.txt2img_calls.get(), 1);
        assert_eq!(service.img2img_calls.get(), 3);
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(*path, store.frame_path(i as u32));
            assert!(path.exists());
        }
    }

    #[test]
    fn stops_appending_at_first_failure() {
        let (_dir, mut store) = store();
        // initial + 2 evolved succeed, third evolve fails
        let service = CountedService::with_budget(3);

        let paths = run_sequence(&service, &mut store, &AppConfig::default(), 10, None);

        assert_eq!(paths.len(), 3);
        // the sequencer must not keep hammering the service after a failure
        assert_eq!(service.img2img_calls.get(), 3);
        assert_eq!(store.next_index(), 3);
    }

    #[test]
    fn failed_initial_generation_produces_nothing() {
        let (_dir, mut store) = store();
        let service = CountedService::with_budget(0);

        let paths = run_sequence(&service, &mut store, &AppConfig::default(), 5, None);

        assert!(paths.is_empty());
        assert_eq!(store.next_index(), 0);
        assert_eq!(service.img2img_calls.get(), 0);
    }

    #[test]
    fn supplied_seed_skips_txt2img() {
        let (_dir, mut store) = store();
        let service = CountedService::with_budget(2);
        let seed = DynamicImage::ImageRgba8(image::RgbaImage::new(4, 4));

        let paths = run_sequence(&service, &mut store, &AppConfig::default(), 2, Some(seed));

        assert_eq!(service.txt2img_calls.get(), 0);
        assert_eq!(paths.len(), 2);
        // the reused seed was already on disk, so numbering starts at 0 here
        assert_eq!(paths[0], store.frame_path(0));
    }

    #[test]
    fn evolve_prompt_carries_the_step_number() {
        assert_eq!(evolve_prompt("clouds billowing", 7), "clouds billowing, step 7");
    }
}
