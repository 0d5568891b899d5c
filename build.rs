use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    pcm: Pcm,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Pcm {
    device: String,
    mode: String,
    channels: u32,
    rate: u32,
    format: String,
    period_size: usize,
    periods: u32,
}

// Read config.toml at build time and export it as environment variables
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // PCM defaults
    println!("cargo:rustc-env=PCM_DEVICE={}", config.pcm.device);
    println!("cargo:rustc-env=PCM_MODE={}", config.pcm.mode);
    println!("cargo:rustc-env=PCM_CHANNELS={}", config.pcm.channels);
    println!("cargo:rustc-env=PCM_RATE={}", config.pcm.rate);
    println!("cargo:rustc-env=PCM_FORMAT={}", config.pcm.format);
    println!("cargo:rustc-env=PCM_PERIOD_SIZE={}", config.pcm.period_size);
    println!("cargo:rustc-env=PCM_PERIODS={}", config.pcm.periods);
}
