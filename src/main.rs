use explorer_core::ExplorerApp;

fn main() {
    // Optional first argument: path to a JSON config file.
    let app = match std::env::args().nth(1) {
        Some(path) => ExplorerApp::from_config_file(path),
        None => ExplorerApp::new("Terrain Explorer"),
    };
    app.run();
}
