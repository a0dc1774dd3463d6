use crossbeam_channel::{Sender, select};
use flexpool::{BoxError, Outlet, Receiver, Worker};
use std::thread;
use std::time::Duration;

/// Negates every task it receives.
pub struct Negator {
    id: usize,
    input: Receiver<i64>,
    output: Outlet<i64>,
    delay: Duration,
    stop_tx: Sender<()>,
    stop_rx: crossbeam_channel::Receiver<()>,
}

/// Returns a factory building [`Negator`]s that take `delay` per task.
pub fn factory(
    delay: Duration,
) -> impl Fn(usize, Receiver<i64>, Outlet<i64>) -> Result<Negator, BoxError> + Send + Sync + 'static
{
    move |id: usize, input: Receiver<i64>, output: Outlet<i64>| {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        Ok(Negator {
            id,
            input,
            output,
            delay,
            stop_tx,
            stop_rx,
        })
    }
}

impl Worker for Negator {
    type Id = usize;

    fn id(&self) -> usize {
        self.id
    }

    fn process(&self) {
        let mut handled = 0_u64;
        loop {
            select! {
                recv(self.stop_rx) -> _ => break,
                recv(self.input) -> task => {
                    let Ok(task) = task else { break };
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    if self.output.send(-task).is_err() {
                        tracing::error!("Worker {} lost a result: output closed", self.id);
                        break;
                    }
                    handled += 1;
                }
            }
        }
        tracing::debug!("Worker {} handled {handled} task(s)", self.id);
    }

    fn signal_removal(&self) {
        let _ = self.stop_tx.try_send(());
    }
}
