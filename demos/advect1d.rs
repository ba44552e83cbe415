use std::io::Write;
use std::sync::{Arc, Mutex};

use blockflow::executor;
use blockflow::task::TaskStatus;
use blockflow::task_collection::TaskCollection;
use blockflow::task_id::TaskId;
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::info;
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short = 'b', long, default_value = "8")]
    num_blocks: usize,

    #[clap(short = 'n', long, default_value = "400")]
    resolution: usize,

    #[clap(short = 't', long, default_value = "1")]
    num_workers: usize,

    #[clap(short = 'e', long, default_value = "0.25")]
    end_time: f64,
}




struct Mesh {
    shape: usize,
    interval: (f64, f64),
}




// ============================================================================
impl Mesh {

    fn cell_spacing(&self) -> f64 {
        (self.interval.1 - self.interval.0) / self.shape as f64
    }

    fn cell_centers(&self, range: (usize, usize)) -> Vec<f64> {
        let dx = self.cell_spacing();
        (range.0..range.1)
            .map(|i| self.interval.0 + (i as f64 + 0.5) * dx)
            .collect()
    }
}




/**
 * One advected block: its index range on the global mesh, the primitive
 * field, and the guard values most recently received from the two
 * neighbor blocks.
 */
struct Block {
    range: (usize, usize),
    primitive: Vec<f64>,
    guard_l: Option<f64>,
    guard_r: Option<f64>,
}




// ============================================================================
impl Block {

    fn from_model<F>(f: F, range: (usize, usize), mesh: &Mesh) -> Self
    where
        F: Fn(f64) -> f64,
    {
        Self {
            range,
            primitive: mesh.cell_centers(range).iter().cloned().map(f).collect(),
            guard_l: None,
            guard_r: None,
        }
    }

    fn update(&mut self, dx: f64, dt: f64) {
        let gl = self.guard_l.take().unwrap();
        let gr = self.guard_r.take().unwrap();

        let mut pe = Vec::with_capacity(self.primitive.len() + 2);
        pe.push(gl);
        pe.extend_from_slice(&self.primitive);
        pe.push(gr);

        let f = intercell_flux(&pe);

        for (u, fw) in self.primitive.iter_mut().zip(f.windows(2)) {
            *u -= (fw[1] - fw[0]) * dt / dx;
        }
    }
}




/**
 * One crossbeam mailbox pair per block: guard values arrive from the left
 * and right neighbors on their own channels, so a receive task can poll
 * for them without blocking.
 */
struct Mailboxes {
    from_left_tx: Vec<Sender<f64>>,
    from_left_rx: Vec<Receiver<f64>>,
    from_right_tx: Vec<Sender<f64>>,
    from_right_rx: Vec<Receiver<f64>>,
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




// ============================================================================
fn flux(p: f64) -> f64 {
    p
}

fn intercell_flux(primitive: &[f64]) -> Vec<f64> {
    let mut result = vec![0.0; primitive.len() - 1];

    for i in 0..result.len() {
        let fl = flux(primitive[i]);
        let fr = flux(primitive[i + 1]);

        result[i] =

        if fl > 0.0 && fr > 0.0 {
            fl
        } else if fl < 0.0 && fr < 0.0 {
            fr
        } else {
            0.0
        }
    }
    result
}




/**
 * Build the task collection for one time step: an exchange-and-update
 * region in which every block posts its edge values, polls for its
 * neighbors' values, and then updates, followed by a diagnostics region
 * that accumulates the total mass once every block has been updated.
 */
fn build_step(
    blocks: &Arc<Vec<Mutex<Block>>>,
    mail: &Arc<Mailboxes>,
    mesh: &Mesh,
    dt: f64,
) -> (TaskCollection, Arc<Mutex<f64>>) {

    let num_blocks = blocks.len();
    let dx = mesh.cell_spacing();
    let mut collection = TaskCollection::new();
    let region = collection.add_region(num_blocks);

    let send = region.add_task(TaskId::none(), {
        let blocks = blocks.clone();
        let mail = mail.clone();
        move |i| {
            let block = blocks[i].lock().unwrap();
            let l = (i + num_blocks - 1) % num_blocks;
            let r = (i + 1) % num_blocks;

            mail.from_left_tx[r]
                .send(*block.primitive.last().unwrap())
                .unwrap();
            mail.from_right_tx[l].send(block.primitive[0]).unwrap();
            TaskStatus::Complete
        }
    });

    let recv = region.add_task(send, {
        let blocks = blocks.clone();
        let mail = mail.clone();
        move |i| {
            let mut block = blocks[i].lock().unwrap();

            if block.guard_l.is_none() {
                block.guard_l = mail.from_left_rx[i].try_recv().ok();
            }
            if block.guard_r.is_none() {
                block.guard_r = mail.from_right_rx[i].try_recv().ok();
            }
            if block.guard_l.is_some() && block.guard_r.is_some() {
                TaskStatus::Complete
            } else {
                TaskStatus::Incomplete
            }
        }
    });

    region.add_task(send | recv, {
        let blocks = blocks.clone();
        move |i| {
            blocks[i].lock().unwrap().update(dx, dt);
            TaskStatus::Complete
        }
    });

    let mass = Arc::new(Mutex::new(0.0));
    let measure = collection.add_region(num_blocks);

    measure.add_task(TaskId::none(), {
        let blocks = blocks.clone();
        let mass = mass.clone();
        move |i| {
            let block = blocks[i].lock().unwrap();
            *mass.lock().unwrap() += block.primitive.iter().sum::<f64>() * dx;
            TaskStatus::Complete
        }
    });

    (collection, mass)
}




// ============================================================================
fn main() {
    let opts = Opts::parse();

    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let mesh = Mesh {
        shape: opts.resolution,
        interval: (0.0, 1.0),
    };
    let model = |x: f64| f64::exp(-1e2 * (x - 0.5).powi(2));
    let n = mesh.shape / opts.num_blocks;

    let blocks: Arc<Vec<Mutex<Block>>> = Arc::new(
        (0..opts.num_blocks)
            .map(|i| Mutex::new(Block::from_model(model, (i * n, (i + 1) * n), &mesh)))
            .collect(),
    );
    let mail = Arc::new(Mailboxes::new(opts.num_blocks));

    let dt = mesh.cell_spacing() * 0.5;
    let mut time = 0.0;
    let mut iteration = 0;

    while time < opts.end_time {
        let (mut collection, mass) = build_step(&blocks, &mail, &mesh, dt);

        if opts.num_workers > 1 {
            executor::execute_par(&mut collection, opts.num_workers).unwrap();
        } else {
            collection.execute().unwrap();
        }
        time += dt;
        iteration += 1;

        if iteration % 50 == 0 {
            info!(
                "[{}] t={:.4} mass={:.12}",
                iteration,
                time,
                mass.lock().unwrap()
            );
        }
    }

    for (n, block) in blocks.iter().enumerate() {
        let block = block.lock().unwrap();
        let file = std::fs::File::create(format!("solution-{}.dat", n)).unwrap();
        let x = mesh.cell_centers(block.range);

        for (x, p) in x.iter().zip(&block.primitive) {
            writeln!(&file, "{:+.8e} {:+.8e}", x, p).unwrap();
        }
    }
}
