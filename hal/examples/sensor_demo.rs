//! Roomwatch HAL Sensor Demo
//!
//! Reads each supported device once and watches the PIR input for a few
//! seconds, blinking the indicator LED on every rising edge.

use roomwatch_hal::{
    gpio::{GpioLed, PirInput},
    i2c::I2CBus,
    iio::IioAdc,
    shtc3::Shtc3,
    ActiveLevel, AnalogInput, BlinkLed, ClimateSensor, DigitalInput, HardwareDevice, Indicator,
};
use std::time::{Duration, Instant};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("roomwatch_hal=info")
        .init();

    println!("=== Roomwatch HAL Sensor Demo ===\n");

    println!("--- Temperature/Humidity (SHTC3) ---");
    match I2CBus::open("/dev/i2c-1") {
        Ok(bus) => {
            let mut chip = Shtc3::new("shtc3", bus);
            chip.init()?;
            let reading = chip.measure()?;
            println!("  Temperature: {:.1}°C", reading.temperature);
            println!("  Humidity: {:.1}%", reading.humidity);
        }
        Err(_) => println!("  [Not connected]"),
    }

    println!("\n--- Light (IIO channel 0) ---");
    match IioAdc::new("light", 0, 0, 4095) {
        Ok(mut adc) => println!("  Raw counts: {}", adc.read_raw()?),
        Err(_) => println!("  [Not connected]"),
    }

    println!("\n--- PIR Motion Sensor ---");
    match PirInput::new("pir", 25, ActiveLevel::High) {
        Ok(mut pir) => {
            let mut led = GpioLed::new("blue", 27, ActiveLevel::High)
                .map(|out| BlinkLed::new("blue", out, Duration::from_millis(500)))
                .ok();

            println!("  Monitoring for motion (5 seconds)...");
            let start = Instant::now();
            let mut last = false;
            let mut edges = 0;
            while start.elapsed() < Duration::from_secs(5) {
                let motion = pir.read_level()?;
                if motion && !last {
                    edges += 1;
                    println!("  ! Motion detected!");
                    if let Some(led) = led.as_mut() {
                        led.blink(1);
                    }
                }
                last = motion;
                if let Some(led) = led.as_mut() {
                    led.tick(start.elapsed());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            println!("  Total motion events: {}", edges);
        }
        Err(_) => println!("  [Not connected]"),
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
