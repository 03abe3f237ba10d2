/// Hardware abstraction for supported boards.
///
/// Each board module defines the HC-SR04 wiring and the status LED,
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const TRIG_PIN: u8 = 1;
    pub const ECHO_PIN: u8 = 2; // through a 5V -> 3V3 divider
    pub const LED_PIN: u8 = 21; // user LED, active low
    pub const LED_ACTIVE_LOW: bool = true;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-devkit")]
mod hw {
    pub const TRIG_PIN: u8 = 5;
    pub const ECHO_PIN: u8 = 18;
    pub const LED_PIN: u8 = 2; // on-board blue LED
    pub const LED_ACTIVE_LOW: bool = false;
    pub const BOARD_NAME: &str = "esp32_devkitc";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-devkit")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
