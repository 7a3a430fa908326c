use sd_morph::gui::app::MorphApp;

fn main() -> iced::Result {
    tracing_subscriber::fmt::init();

    iced::application("SD Morph", MorphApp::update, MorphApp::view)
        .subscription(MorphApp::subscription)
        .theme(MorphApp::theme)
        .window_size((760.0, 860.0))
        .centered()
        .run_with(MorphApp::new)
}
