use emu_core::System;
use std::env;

fn main() {
    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: headless <rom>");
        return;
    };

    let image = match std::fs::read(&path) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{}: {}", path, err);
            return;
        }
    };

    let mut sys = emu_sms::SmsSystem::default();
    if let Err(err) = sys.mount("Cartridge", &image) {
        eprintln!("{}: {}", path, err);
        return;
    }
    match sys.step_frame() {
        Ok(frame) => println!("Headless SMS frame: {}x{}", frame.width, frame.height),
        Err(err) => eprintln!("{}", err),
    }
    match serde_json::to_string_pretty(&sys.save_state()) {
        Ok(state) => println!("Save-state: {}", state),
        Err(err) => eprintln!("{}", err),
    }
}
