fn main() {
    // ESP-IDF link args and app_main glue
    embuild::espidf::sysenv::output();

    // Rebuild when the baked-in node configuration changes
    for var in [
        "DEVICE_ID",
        "WIFI_SSID",
        "WIFI_PASSWORD",
        "COLLECTOR_HOST",
        "COLLECTOR_PORT",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
}
