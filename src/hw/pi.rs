//! Raspberry Pi drivers for the robot chassis.
//!
//! Motors sit behind a dual H-bridge on software-PWM GPIO pins, the
//! underlighting is an SN3218 18-channel LED driver on I²C, and the
//! proximity sensor is an HC-SR04 ultrasonic module.

use std::thread;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use rppal::i2c::I2c;
use tracing::{debug, info};

use super::{DistanceSensor, DriverError, LedDriver, MotionDriver};
use crate::core::leds::FrameBuffer;

// BCM pin assignments of the chassis.
const MOTOR_EN_PIN: u8 = 26;
const MOTOR_LEFT_P_PIN: u8 = 8;
const MOTOR_LEFT_N_PIN: u8 = 11;
const MOTOR_RIGHT_P_PIN: u8 = 10;
const MOTOR_RIGHT_N_PIN: u8 = 9;
const ULTRA_TRIG_PIN: u8 = 13;
const ULTRA_ECHO_PIN: u8 = 25;

const MOTOR_PWM_HZ: f64 = 100.0;

const SN3218_ADDR: u16 = 0x54;
const SN3218_REG_ENABLE: u8 = 0x00;
const SN3218_REG_PWM_BASE: u8 = 0x01;
const SN3218_REG_ENABLE_LEDS: u8 = 0x13;
const SN3218_REG_UPDATE: u8 = 0x16;

const ECHO_TIMEOUT: Duration = Duration::from_millis(25);
const SPEED_OF_SOUND_M_S: f32 = 343.0;

fn gpio_err(e: rppal::gpio::Error) -> DriverError {
    DriverError::Gpio(e.to_string())
}

fn i2c_err(e: rppal::i2c::Error) -> DriverError {
    DriverError::I2c(e.to_string())
}

/// H-bridge motor driver: one PWM duty per direction pin, enable line
/// dropped whenever both wheels are commanded to zero.
pub struct PiMotionDriver {
    enable: OutputPin,
    left_p: OutputPin,
    left_n: OutputPin,
    right_p: OutputPin,
    right_n: OutputPin,
}

impl PiMotionDriver {
    pub fn new() -> Result<Self, DriverError> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        info!("Initializing H-bridge motor driver");
        Ok(Self {
            enable: gpio.get(MOTOR_EN_PIN).map_err(gpio_err)?.into_output_low(),
            left_p: gpio.get(MOTOR_LEFT_P_PIN).map_err(gpio_err)?.into_output_low(),
            left_n: gpio.get(MOTOR_LEFT_N_PIN).map_err(gpio_err)?.into_output_low(),
            right_p: gpio.get(MOTOR_RIGHT_P_PIN).map_err(gpio_err)?.into_output_low(),
            right_n: gpio.get(MOTOR_RIGHT_N_PIN).map_err(gpio_err)?.into_output_low(),
        })
    }
}

fn set_side(p: &mut OutputPin, n: &mut OutputPin, speed: f32) -> Result<(), DriverError> {
    let duty = f64::from(speed.abs().clamp(0.0, 1.0));
    if speed >= 0.0 {
        p.set_pwm_frequency(MOTOR_PWM_HZ, duty).map_err(gpio_err)?;
        n.set_pwm_frequency(MOTOR_PWM_HZ, 0.0).map_err(gpio_err)?;
    } else {
        p.set_pwm_frequency(MOTOR_PWM_HZ, 0.0).map_err(gpio_err)?;
        n.set_pwm_frequency(MOTOR_PWM_HZ, duty).map_err(gpio_err)?;
    }
    Ok(())
}

impl MotionDriver for PiMotionDriver {
    fn drive(&mut self, left: f32, right: f32) -> Result<(), DriverError> {
        if left == 0.0 && right == 0.0 {
            self.enable.set_low();
        } else {
            self.enable.set_high();
        }
        set_side(&mut self.left_p, &mut self.left_n, left)?;
        set_side(&mut self.right_p, &mut self.right_n, right)?;
        Ok(())
    }
}

/// SN3218 underlighting driver. Channels are laid out as six consecutive
/// RGB triples matching the frame buffer's strip order.
pub struct PiLedDriver {
    i2c: I2c,
}

impl PiLedDriver {
    pub fn new() -> Result<Self, DriverError> {
        let mut i2c = I2c::new().map_err(i2c_err)?;
        i2c.set_slave_address(SN3218_ADDR).map_err(i2c_err)?;
        info!("Initializing SN3218 underlighting driver");

        i2c.write(&[SN3218_REG_ENABLE, 0x01]).map_err(i2c_err)?;
        // Enable bits come in three banks of six channels.
        i2c.write(&[SN3218_REG_ENABLE_LEDS, 0x3F, 0x3F, 0x3F])
            .map_err(i2c_err)?;
        i2c.write(&[SN3218_REG_UPDATE, 0xFF]).map_err(i2c_err)?;
        Ok(Self { i2c })
    }
}

impl LedDriver for PiLedDriver {
    fn render(&mut self, frame: &FrameBuffer) -> Result<(), DriverError> {
        let mut payload = [0u8; 19];
        payload[0] = SN3218_REG_PWM_BASE;
        for (i, pixel) in frame.iter().enumerate() {
            payload[1 + i * 3] = pixel.r;
            payload[2 + i * 3] = pixel.g;
            payload[3 + i * 3] = pixel.b;
        }
        self.i2c.write(&payload).map_err(i2c_err)?;
        self.i2c.write(&[SN3218_REG_UPDATE, 0xFF]).map_err(i2c_err)?;
        Ok(())
    }
}

/// HC-SR04 ultrasonic rangefinder.
///
/// A read blocks for up to two echo timeouts (~50 ms worst case); it is
/// only ever called from the distance sampling task, never from the tick
/// loops.
pub struct PiDistanceSensor {
    trig: OutputPin,
    echo: InputPin,
}

impl PiDistanceSensor {
    pub fn new() -> Result<Self, DriverError> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        info!("Initializing ultrasonic distance sensor");
        Ok(Self {
            trig: gpio.get(ULTRA_TRIG_PIN).map_err(gpio_err)?.into_output_low(),
            echo: gpio.get(ULTRA_ECHO_PIN).map_err(gpio_err)?.into_input(),
        })
    }

    fn wait_for(&self, level: Level, timeout: Duration) -> Result<Instant, DriverError> {
        let started = Instant::now();
        while self.echo.read() != level {
            if started.elapsed() > timeout {
                return Err(DriverError::Timeout(timeout));
            }
        }
        Ok(Instant::now())
    }
}

impl DistanceSensor for PiDistanceSensor {
    fn read_distance(&mut self) -> Result<f32, DriverError> {
        self.trig.set_high();
        thread::sleep(Duration::from_micros(10));
        self.trig.set_low();

        let rising = self.wait_for(Level::High, ECHO_TIMEOUT)?;
        let falling = self.wait_for(Level::Low, ECHO_TIMEOUT)?;
        let pulse = falling.duration_since(rising);

        let meters = pulse.as_secs_f32() * SPEED_OF_SOUND_M_S / 2.0;
        debug!("Ultrasonic pulse {:?} -> {:.3} m", pulse, meters);
        Ok(meters)
    }
}
