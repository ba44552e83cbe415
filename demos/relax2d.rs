use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use blockflow::executor;
use blockflow::task::TaskStatus;
use blockflow::task_collection::TaskCollection;
use blockflow::task_id::TaskId;
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::info;
use rayon::prelude::*;
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short = 'b', long, default_value = "4")]
    num_blocks: usize,

    #[clap(short = 'n', long, default_value = "128")]
    resolution: usize,

    #[clap(short = 't', long, default_value = "1")]
    num_workers: usize,

    #[clap(long, default_value = "1e-6")]
    tolerance: f64,

    #[clap(long, default_value = "100000")]
    max_cycles: u64,

    #[clap(long, default_value = "100")]
    ncycle_out: u64,
}




#[derive(serde::Serialize)]


/**
 * One vertical strip of the relaxation problem: a range of interior
 * columns, the current and next field arrays (column-major), the fixed
 * source term, and the guard columns most recently received from the
 * neighbor strips (or imposed by the physical boundary).
 */
struct Strip {
    range: (usize, usize),
    ny: usize,
    base: Vec<f64>,
    update: Vec<f64>,
    source: Vec<f64>,
    guard_l: Option<Vec<f64>>,
    guard_r: Option<Vec<f64>>,
    delta: f64,
}




// ============================================================================
impl Strip {

    fn new(range: (usize, usize), ny: usize, h: f64) -> Self {
        let w = range.1 - range.0;
        let source = (0..w)
            .flat_map(|c| {
                let x = (range.0 + c + 1) as f64 * h;
                (0..ny).map(move |r| {
                    let y = (r + 1) as f64 * h;
                    -2.0 * PI * PI * (PI * x).sin() * (PI * y).sin()
                })
            })
            .collect();

        Self {
            range,
            ny,
            base: vec![0.0; w * ny],
            update: vec![0.0; w * ny],
            source,
            guard_l: Some(vec![0.0; ny]),
            guard_r: Some(vec![0.0; ny]),
            delta: 0.0,
        }
    }

    fn width(&self) -> usize {
        self.range.1 - self.range.0
    }

    /**
     * One Jacobi sweep over the strip interior, reading the current field
     * and the guard columns, writing the next field, and recording the
     * largest pointwise change. The guard columns are consumed; the
     * exchange tasks later in the cycle replace them.
     */
    fn smooth(&mut self, h: f64) {
        let gl = self.guard_l.take().unwrap();
        let gr = self.guard_r.take().unwrap();
        let (w, ny) = (self.width(), self.ny);

        self.delta = 0.0;

        for c in 0..w {
            for r in 0..ny {
                let phi_w = if c == 0 { gl[r] } else { self.base[(c - 1) * ny + r] };
                let phi_e = if c == w - 1 { gr[r] } else { self.base[(c + 1) * ny + r] };
                let phi_s = if r == 0 { 0.0 } else { self.base[c * ny + r - 1] };
                let phi_n = if r == ny - 1 { 0.0 } else { self.base[c * ny + r + 1] };

                let phi = 0.25 * (phi_w + phi_e + phi_s + phi_n - h * h * self.source[c * ny + r]);
                self.update[c * ny + r] = phi;
                self.delta = self.delta.max((phi - self.base[c * ny + r]).abs());
            }
        }
    }

    fn column(&self, c: usize) -> Vec<f64> {
        self.update[c * self.ny..(c + 1) * self.ny].to_vec()
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.base, &mut self.update)
    }
}




struct Mailboxes {
    from_left_tx: Vec<Sender<Vec<f64>>>,
    from_left_rx: Vec<Receiver<Vec<f64>>>,
    from_right_tx: Vec<Sender<Vec<f64>>>,
    from_right_rx: Vec<Receiver<Vec<f64>>>,
}




// ============================================================================
impl Mailboxes {

    fn new(num_blocks: usize) -> Self {
        let (from_left_tx, from_left_rx) = (0..num_blocks).map(|_| unbounded()).unzip();
        let (from_right_tx, from_right_rx) = (0..num_blocks).map(|_| unbounded()).unzip();
        Self {
            from_left_tx,
            from_left_rx,
            from_right_tx,
            from_right_rx,
        }
    }
}




/**
 * Build the task collection for one relaxation cycle: every strip
 * smooths, sends its updated edge columns to the neighbors it has, polls
 * for the neighbors' columns, then swaps its field arrays. The physical
 * boundary is applied by per-strip additions on the two edge strips
 * only, which is the one place the per-partition graphs legitimately
 * differ.
 */
fn build_cycle(
    strips: &Arc<Vec<Mutex<Strip>>>,
    mail: &Arc<Mailboxes>,
    h: f64,
) -> TaskCollection {

    let num_blocks = strips.len();
    let last = num_blocks - 1;
    let mut collection = TaskCollection::new();
    let region = collection.add_region(num_blocks);

    let smooth = region.add_task(TaskId::none(), {
        let strips = strips.clone();
        move |i| {
            strips[i].lock().unwrap().smooth(h);
            TaskStatus::Complete
        }
    });

    let send = region.add_task(smooth, {
        let strips = strips.clone();
        let mail = mail.clone();
        move |i| {
            let strip = strips[i].lock().unwrap();

            if i > 0 {
                mail.from_right_tx[i - 1].send(strip.column(0)).unwrap();
            }
            if i < last {
                mail.from_left_tx[i + 1]
                    .send(strip.column(strip.width() - 1))
                    .unwrap();
            }
            TaskStatus::Complete
        }
    });

    let recv = region.add_task(send, {
        let strips = strips.clone();
        let mail = mail.clone();
        move |i| {
            let mut strip = strips[i].lock().unwrap();

            if i > 0 && strip.guard_l.is_none() {
                strip.guard_l = mail.from_left_rx[i].try_recv().ok();
            }
            if i < last && strip.guard_r.is_none() {
                strip.guard_r = mail.from_right_rx[i].try_recv().ok();
            }
            let need_l = i > 0 && strip.guard_l.is_none();
            let need_r = i < last && strip.guard_r.is_none();

            if need_l || need_r {
                TaskStatus::Incomplete
            } else {
                TaskStatus::Complete
            }
        }
    });

    let swap = region.add_task(smooth | recv, {
        let strips = strips.clone();
        move |i| {
            strips[i].lock().unwrap().swap();
            TaskStatus::Complete
        }
    });

    // Dirichlet boundary on the outermost columns of the domain.
    {
        let strips = strips.clone();
        region[0].add_task(swap, move || {
            let mut strip = strips[0].lock().unwrap();
            strip.guard_l = Some(vec![0.0; strip.ny]);
            TaskStatus::Complete
        });
    }
    {
        let strips = strips.clone();
        region[last].add_task(swap, move || {
            let mut strip = strips[last].lock().unwrap();
            strip.guard_r = Some(vec![0.0; strip.ny]);
            TaskStatus::Complete
        });
    }

    collection
}




#[derive(serde::Serialize)]


/**
 * The converged solution state
 */
struct State {
    cycle: u64,
    residual: f64,
    strips: Vec<Strip>,
}




// ============================================================================
fn main() {
    let opts = Opts::parse();

    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let n = opts.resolution;
    let h = 1.0 / (n + 1) as f64;
    let w = n / opts.num_blocks;

    let strips: Arc<Vec<Mutex<Strip>>> = Arc::new(
        (0..opts.num_blocks)
            .map(|i| Mutex::new(Strip::new((i * w, (i + 1) * w), n, h)))
            .collect(),
    );
    let mail = Arc::new(Mailboxes::new(opts.num_blocks));

    let mut cycle = 0;
    let mut residual = f64::MAX;

    while residual > opts.tolerance && cycle < opts.max_cycles {
        let mut collection = build_cycle(&strips, &mail, h);

        if opts.num_workers > 1 {
            executor::execute_par(&mut collection, opts.num_workers).unwrap();
        } else {
            collection.execute().unwrap();
        }
        residual = strips
            .par_iter()
            .map(|strip| strip.lock().unwrap().delta)
            .reduce(|| 0.0, f64::max);
        cycle += 1;

        if cycle % opts.ncycle_out == 0 {
            println!("cycle={} residual={:.12e}", cycle, residual);
        }
    }

    let strips = Arc::try_unwrap(strips).ok().unwrap();
    let strips: Vec<_> = strips
        .into_iter()
        .map(|strip| strip.into_inner().unwrap())
        .collect();

    let error = strips
        .iter()
        .map(|strip| {
            let ny = strip.ny;
            strip
                .base
                .iter()
                .enumerate()
                .map(|(k, phi)| {
                    let x = (strip.range.0 + k / ny + 1) as f64 * h;
                    let y = (k % ny + 1) as f64 * h;
                    (phi - (PI * x).sin() * (PI * y).sin()).abs()
                })
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max);

    info!(
        "finished after {} cycles: residual={:.3e} error={:.3e}",
        cycle, residual, error
    );

    let state = State {
        cycle,
        residual,
        strips,
    };
    let file = std::fs::File::create("state.cbor").unwrap();
    let mut buffer = std::io::BufWriter::new(file);
    ciborium::ser::into_writer(&state, &mut buffer).unwrap();
}
