//! Demonstration of a recording session without hardware.
//!
//! This example shows how to:
//! 1. Script a capture board with a few button presses
//! 2. Run a primitive session and a continuous session
//! 3. Confirm labels from another thread while the session waits
//! 4. Inspect the files and statistics the sessions produce
//!
//! Run with: cargo run --example scripted_session

use std::fs;
use std::thread;
use std::time::Duration;

use davis_capture::{
    capture::{Decision, ScriptedEngine},
    core::OutputLayout,
    session::{Notice, SessionController, SessionRequest},
    sink::CsvSink,
    OPERATOR_GUIDE,
};

fn main() {
    println!("davis-capture - Scripted Session Demo");
    println!("=====================================");
    println!("{OPERATOR_GUIDE}");

    let output = match tempfile::TempDir::new() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error creating output directory: {e}");
            return;
        }
    };
    if let Err(e) = fs::create_dir(output.path().join("grasp")) {
        eprintln!("Error creating primitive folder: {e}");
        return;
    }
    println!("Output: {}", output.path().display());
    println!();

    // Two attempts of a primitive, the board presses red after the first
    let engine = ScriptedEngine::new()
        .with_capture(vec![120, 180, 260], 1_700_000_000)
        .then(Decision::Continue)
        .with_capture(vec![40, 95], 1_700_000_060)
        .then(Decision::Quit);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller =
        SessionController::new(engine, CsvSink::new(), OutputLayout::new(output.path()))
            .with_notices(tx.clone());

    match controller.run(&SessionRequest::primitive("pick", "grasp")) {
        Ok(summary) => println!("Primitive session saved {} attempt(s)", summary.attempts_saved),
        Err(e) => eprintln!("Primitive session failed: {e}"),
    }
    for notice in rx.try_iter() {
        println!("  {notice}");
    }
    println!();

    // One continuous attempt with three segments; the first label list is short
    let engine = ScriptedEngine::new()
        .with_capture(vec![1, 2, 4, 6, 7, 9], 1_700_000_120)
        .then(Decision::Quit);
    let mut controller =
        SessionController::new(engine, CsvSink::new(), OutputLayout::new(output.path()))
            .with_notices(tx);

    let labels = controller.labels();
    let typist = thread::spawn(move || {
        let _ = labels.confirm("3,1");
        thread::sleep(Duration::from_millis(200));
        let _ = labels.confirm("3,1,2");
    });

    let printer = thread::spawn(move || {
        for notice in rx {
            println!("  {notice}");
            if matches!(notice, Notice::SessionEnded { .. } | Notice::Error(_)) {
                break;
            }
        }
    });

    let result = controller.run(&SessionRequest::continuous("assembly"));
    let _ = typist.join();
    let _ = printer.join();

    match result {
        Ok(summary) => {
            println!("Continuous session saved {} attempt(s)", summary.attempts_saved);
            for path in &summary.saved {
                match fs::read_to_string(path) {
                    Ok(content) => {
                        println!("{}:", path.display());
                        print!("{content}");
                    }
                    Err(e) => eprintln!("Error reading {}: {e}", path.display()),
                }
            }
        }
        Err(e) => eprintln!("Continuous session failed: {e}"),
    }

    println!();
    println!("{}", controller.stats().summary());
}
