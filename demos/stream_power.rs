use std::{
    error::Error,
    f32::consts::TAU,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    thread,
    time::Duration,
};

use clap::Parser;
use num_complex::Complex;
use sdrplay3::{
    CommandValue,
    Model,
    Rsp,
    RspOptions,
    Session,
    api::sim::SimulatedApi,
};

#[derive(Debug, Parser)]
struct Args {
    /// RSP1, RSP1A, RSP1B, RSP2, RSPduo, RSPdx or RSPdx-R2
    #[clap(short, long, env = "SDRPLAY_MODEL", default_value = "RSP1A")]
    model: String,

    #[clap(short, long, env = "SDRPLAY_SERIAL", default_value = "1A0001")]
    serial: String,

    #[clap(short, long, default_value = "100000000")]
    frequency: f64,

    #[clap(short = 'r', long = "samplerate", default_value = "2000000")]
    sample_rate: f64,

    /// IF gain in dB
    #[clap(short, long, default_value = "-40", allow_negative_numbers = true)]
    gain: f64,
}

/// samples per callback of the simulated device
const BURST: usize = 1344;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let model = Model::ALL
        .into_iter()
        .find(|model| model.name().eq_ignore_ascii_case(&args.model))
        .ok_or_else(|| format!("unknown model: {}", args.model))?;

    let api = Arc::new(SimulatedApi::new().with_device(model.hw_version(), &args.serial));
    let session = Session::open(api.clone())?;
    for device in session.devices()? {
        println!("found {} ({:?})", device.serial, device.hw_version);
    }

    let mut rsp = Rsp::open(session, model, &args.serial, RspOptions::default())?;
    rsp.set_sample_rate(args.sample_rate);
    rsp.set_center_freq(args.frequency);
    rsp.set_gain_mode(false);
    rsp.set_gain(args.gain, "IF");
    rsp.start()?;

    // a tone at a quarter of the sample rate, at -12 dBFS
    let handle = rsp.device().handle;
    let feeder = {
        let api = api.clone();
        let sample_rate = args.sample_rate;
        thread::spawn(move || {
            let amplitude = 8192.0;
            let mut phase = 0.0f32;
            let mut xi = vec![0i16; BURST];
            let mut xq = vec![0i16; BURST];
            let burst_duration = Duration::from_secs_f64(BURST as f64 / sample_rate);
            loop {
                for (i, q) in xi.iter_mut().zip(&mut xq) {
                    *i = (amplitude * phase.cos()) as i16;
                    *q = (amplitude * phase.sin()) as i16;
                    phase = (phase + TAU / 4.0) % TAU;
                }
                if !api.deliver(handle, 0, &xi, &xq) {
                    break;
                }
                thread::sleep(burst_duration);
            }
        })
    };

    let commands = rsp.command_sender();
    let running = Arc::new(AtomicBool::new(true));
    let reader = {
        let running = running.clone();
        let sample_rate = args.sample_rate as usize;
        tokio::task::spawn_blocking(move || {
            let mut buffer = vec![Complex::<f32>::default(); BURST];

            // this is really a measure of energy
            let mut power_sum = 0.0;
            let mut num_samples = 0;

            while running.load(Ordering::Relaxed) {
                let n = rsp.work(&mut [&mut buffer[..]]);
                for sample in &buffer[..n] {
                    power_sum += sample.norm_sqr();
                    num_samples += 1;

                    if num_samples == sample_rate {
                        // average power, converted to dBFS
                        let power_avg = power_sum / num_samples as f32;
                        let db = 10.0 * power_avg.log10();
                        println!("{db:.4} dBFS");

                        power_sum = 0.0;
                        num_samples = 0;
                    }
                }
            }
            rsp.stop();
        })
    };

    // change the frequency from another task while streaming
    commands
        .send([("freq", CommandValue::from(args.frequency + 1e6))])
        .await?;

    tokio::signal::ctrl_c().await?;
    running.store(false, Ordering::Relaxed);
    reader.await?;
    let _ = feeder.join();

    Ok(())
}
