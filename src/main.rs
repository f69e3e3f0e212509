use mpr_volume::{EngineConfig, MprEngine, Orientation, PixelData, QualityPreset, Slice};
use tracing_subscriber::EnvFilter;

const SIZE: usize = 256;
const SLICES: usize = 40;

/// Synthetic axial series: a sphere of soft tissue in air, 2.5mm apart.
fn synthetic_series() -> Vec<Slice> {
    let center = SIZE as f64 / 2.0;
    let radius = SIZE as f64 * 0.4;
    (0..SLICES)
        .map(|z| {
            let dz = (z as f64 - SLICES as f64 / 2.0) * 2.5 / 0.8;
            let pixels = (0..SIZE * SIZE)
                .map(|i| {
                    let dx = (i % SIZE) as f64 - center;
                    let dy = (i / SIZE) as f64 - center;
                    if dx * dx + dy * dy + dz * dz < radius * radius {
                        1064
                    } else {
                        0
                    }
                })
                .collect();
            Slice::new(SIZE, SIZE, PixelData::I16(pixels))
                .with_position([0.0, 0.0, z as f64 * 2.5])
                .with_pixel_spacing([0.8, 0.8])
                .with_rescale(1.0, -1024.0)
                .with_instance_number(z as i32 + 1)
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = MprEngine::new(EngineConfig::with_quality(QualityPreset::High))
        .expect("should have created engine");
    engine
        .build_volume(&synthetic_series())
        .expect("should have built volume");

    for orientation in Orientation::ALL {
        let slice = engine
            .get_or_compute(orientation, 0.5, engine.default_method())
            .expect("should have returned slice at center of volume");
        let image = slice.to_image().expect("slice should be contiguous");
        image
            .save(format!("{orientation}.png"))
            .expect("should have written image");
    }

    let diagnostics = engine.run_diagnostics();
    println!(
        "healthy: {}, fill ratio: {:?}",
        diagnostics.is_healthy(),
        diagnostics.fill_ratio()
    );
    engine.dispose();
}
