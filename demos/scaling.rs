use blockflow::executor;
use blockflow::task::TaskStatus;
use blockflow::task_collection::TaskCollection;
use blockflow::task_id::TaskId;
use clap::Parser;
use rayon::prelude::*;

#[derive(Debug, Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short = 't', long, default_value = "1")]
    num_workers: usize,

    #[clap(short = 'b', long, default_value = "64")]
    num_blocks: usize,

    #[clap(short = 'n', long, default_value = "10")]
    tasks_per_block: usize,

    #[clap(short = 'w', long, default_value = "100000")]
    work_per_task: usize,
}




/**
 * Build a collection with one region of `num_blocks` lists, each holding
 * a chain of spin-work tasks where every task depends on the one before
 * it. The chains are independent across blocks, so the workload scales
 * with the worker count up to the block count.
 */
fn build(opts: &Opts) -> TaskCollection {
    let mut collection = TaskCollection::new();
    let region = collection.add_region(opts.num_blocks);
    let work = opts.work_per_task;
    let mut prev = TaskId::none();

    for _ in 0..opts.tasks_per_block {
        prev = region.add_task(prev, move |_| {
            let _: f64 = (0..work).map(|n| n as f64).sum();
            TaskStatus::Complete
        });
    }
    collection
}

fn report(name: &str, duration: f64, opts: &Opts) {
    let num_tasks = (opts.num_blocks * opts.tasks_per_block) as f64;
    println!();
    println!("{}", name);
    println!("total ................. {}s", duration);
    println!(
        "cpu-s ................. {}",
        duration * opts.num_workers as f64
    );
    println!(
        "cpu-ns / task / work .. {}",
        duration * opts.num_workers as f64 / num_tasks / opts.work_per_task as f64 * 1e9
    );
}




// ============================================================================
fn main() {
    let opts = Opts::parse();
    println!("{:?}", opts);

    let duration = {
        let mut collection = build(&opts);
        let start = std::time::Instant::now();
        collection.execute().unwrap();
        start.elapsed().as_secs_f64()
    };
    report("blockflow::TaskCollection::execute", duration, &opts);

    let duration = {
        let mut collection = build(&opts);
        let start = std::time::Instant::now();
        executor::execute_par(&mut collection, opts.num_workers).unwrap();
        start.elapsed().as_secs_f64()
    };
    report("blockflow::executor::execute_par", duration, &opts);

    let duration = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.num_workers)
            .build()
            .unwrap();
        let work = opts.work_per_task;
        let data: Vec<_> = (0..opts.num_blocks * opts.tasks_per_block).collect();
        let start = std::time::Instant::now();
        pool.install(|| {
            data.par_iter().for_each(|_| {
                let _: f64 = (0..work).map(|n| n as f64).sum();
            });
        });
        start.elapsed().as_secs_f64()
    };
    report("rayon::par_iter (no dependencies)", duration, &opts);
}
