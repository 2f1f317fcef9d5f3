use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

pub const MAX_INPUT_SIZE: usize = 256 * 1024;

pub const TIMEOUT: Duration = Duration::from_secs(1);

/// Runs each input on a dedicated worker thread so a hang surfaces as a
/// timeout panic instead of stalling the fuzzer.
pub struct Runner {
    input_tx: mpsc::SyncSender<Vec<u8>>,
    output_rx: Mutex<mpsc::Receiver<()>>,
}

impl Runner {
    pub fn spawn(name: &'static str, work: fn(&[u8])) -> Self {
        let (input_tx, input_rx) = mpsc::sync_channel::<Vec<u8>>(0);
        let (output_tx, output_rx) = mpsc::sync_channel::<()>(0);

        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                for input in input_rx {
                    work(&input);
                    let _ = output_tx.send(());
                }
            })
            .expect("spawn fuzz worker");

        Runner {
            input_tx,
            output_rx: Mutex::new(output_rx),
        }
    }

    pub fn run(&self, name: &str, data: &[u8]) {
        let cap = data.len().min(MAX_INPUT_SIZE);
        self.input_tx
            .send(data[..cap].to_vec())
            .unwrap_or_else(|_| panic!("{name} worker thread exited"));

        match self
            .output_rx
            .lock()
            .unwrap_or_else(|_| panic!("{name} worker receiver poisoned"))
            .recv_timeout(TIMEOUT)
        {
            Ok(()) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => panic!("{name} fuzz target timed out"),
            Err(mpsc::RecvTimeoutError::Disconnected) => panic!("{name} worker thread panicked"),
        }
    }
}
