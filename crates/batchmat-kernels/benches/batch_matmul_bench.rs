//! Benchmark: batched matmul across batch/size regimes, CPU schedule vs
//! the host-emulated GEMM stream.
//!
//! Run with: RUST_LOG=batchmat_kernels=debug cargo bench -p batchmat-kernels

use std::time::Instant;

use batchmat_core::{Complex32, Tensor};
use batchmat_kernels::gpu::{launch_on_host, HostAllocator, HostBlasStream};
use batchmat_kernels::{BatchMatMul, ExecContext, MatMulShapes};
use tracing_subscriber::EnvFilter;

fn data(len: usize, salt: usize) -> Vec<f32> {
    (0..len).map(|i| ((i * 7 + salt) % 13) as f32 * 0.1 - 0.6).collect()
}

fn bench_cpu(ctx: &ExecContext, op: &BatchMatMul, x: &Tensor, y: &Tensor, iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = op.compute(ctx, x, y).unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_host_gemm(x: &[f32], y: &[f32], shapes: &MatMulShapes, iters: usize) -> f64 {
    let stream = HostBlasStream::new();
    let alloc = HostAllocator::new();
    let mut z = vec![0.0f32; shapes.out.numel()];
    let start = Instant::now();
    for _ in 0..iters {
        launch_on_host(&stream, &alloc, x, y, shapes, &mut z).unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn gflops(batch: usize, m: usize, n: usize, k: usize, secs: f64) -> f64 {
    (2.0 * batch as f64 * m as f64 * n as f64 * k as f64) / secs / 1e9
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ctx = ExecContext::default();
    let op = BatchMatMul::new(false, false);
    println!("=== Batched Matmul Benchmark ===");
    println!("threads: {}\n", ctx.num_threads());

    // (batch, m, k, n): many tiny products through one huge product.
    let regimes: &[(usize, usize, usize, usize)] = &[
        (4096, 4, 4, 4),
        (1024, 16, 16, 16),
        (64, 64, 64, 64),
        (8, 128, 128, 128),
        (2, 256, 256, 256),
        (1, 512, 512, 512),
    ];

    println!(
        "{:<18} {:>8} {:>12} {:>10} {:>14} {:>10}",
        "Shape", "Strategy", "CPU (ms)", "CPU GF/s", "Host GEMM (ms)", "Speedup"
    );
    println!("{}", "-".repeat(78));

    for &(batch, m, k, n) in regimes {
        let x_data = data(batch * m * k, 3);
        let y_data = data(batch * k * n, 5);
        let x = Tensor::from_slice(&x_data, &[batch, m, k]).unwrap();
        let y = Tensor::from_slice(&y_data, &[batch, k, n]).unwrap();
        let shapes = MatMulShapes::plan(x.shape(), y.shape(), false, false).unwrap();

        let mut out = vec![0.0f32; shapes.out.numel()];
        let strategy = op
            .compute_into(&ctx, &x_data, x.shape().dims(), &y_data, y.shape().dims(), &mut out)
            .unwrap()
            .map(|r| format!("{:?}", r.strategy()))
            .unwrap_or_default();

        let work = batch * m * k * n;
        let iters = if work <= 1 << 20 { 50 } else if work <= 1 << 24 { 10 } else { 3 };

        let cpu_s = bench_cpu(&ctx, &op, &x, &y, iters);
        let host_s = bench_host_gemm(&x_data, &y_data, &shapes, iters.min(5));

        println!(
            "{:<18} {:>8} {:>10.3}ms {:>10.2} {:>12.3}ms {:>9.1}x",
            format!("{}x{}x{}x{}", batch, m, k, n),
            strategy,
            cpu_s * 1000.0,
            gflops(batch, m, n, k, cpu_s),
            host_s * 1000.0,
            host_s / cpu_s,
        );
    }

    // Complex with both adjoints: exercises the whole-output conjugation.
    println!("\n=== complex64, adj_x = adj_y = true ===");
    let (batch, m, k, n) = (16, 96, 96, 96);
    let x_data: Vec<Complex32> = data(batch * m * k, 1)
        .into_iter()
        .zip(data(batch * m * k, 2))
        .map(|(re, im)| Complex32::new(re, im))
        .collect();
    let x = Tensor::from_vec(x_data, &[batch, k, m]).unwrap();
    let op = BatchMatMul::new(true, true);
    let secs = bench_cpu(&ctx, &op, &x, &x, 10);
    println!(
        "{}x{}x{}x{}: {:.3}ms ({:.2} complex GMAC/s)",
        batch,
        m,
        k,
        n,
        secs * 1000.0,
        (batch * m * n * k) as f64 / secs / 1e9
    );
}
