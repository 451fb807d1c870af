//! Example: denoise a WAV file.
//!
//! Usage: cargo run --example denoise_file -- input.wav output.wav model_1.onnx model_2.onnx

use dtln_rt::{DtlnConfig, DtlnStream, SAMPLE_RATE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 5 {
        eprintln!(
            "Usage: {} <input.wav> <output.wav> <stage_a.onnx> <stage_b.onnx>",
            args[0]
        );
        std::process::exit(1);
    }

    let config = DtlnConfig::new(&args[3], &args[4]);
    let mut stream = DtlnStream::new(config)?;
    println!("Models loaded, latency {:.1} ms", stream.latency_ms());

    let mut reader = hound::WavReader::open(&args[1])?;
    let spec = reader.spec();
    println!(
        "Input: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );
    if spec.sample_rate != SAMPLE_RATE as u32 {
        eprintln!(
            "Warning: input sample rate {} != expected {}. Resample first!",
            spec.sample_rate, SAMPLE_RATE
        );
    }

    let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    let mono: Vec<i16> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|c| c[0])
            .collect()
    } else {
        samples
    };

    println!(
        "Processing {} samples ({:.2}s)...",
        mono.len(),
        mono.len() as f32 / SAMPLE_RATE as f32
    );

    let start = std::time::Instant::now();
    let mut output = Vec::with_capacity(mono.len());
    // Fixed 128-sample chunks, the shape a capture callback typically delivers.
    for chunk in mono.chunks(128) {
        output.extend(stream.process(chunk)?);
    }
    output.extend(stream.flush()?);

    let elapsed = start.elapsed();
    let rtf = elapsed.as_secs_f32() / (mono.len() as f32 / SAMPLE_RATE as f32);
    println!("Done in {:.2}s (RTF: {:.3}x realtime)", elapsed.as_secs_f32(), rtf);

    let out_spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args[2], out_spec)?;
    for &s in &output {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    println!("Saved to {}", args[2]);
    Ok(())
}
