//! Bakes the device configuration into the firmware.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file next to this crate. Wi-Fi credentials are required; everything else
//! has a default. Strings longer than the device buffers stop the build.

use std::env;
use std::fs;
use std::path::PathBuf;

#[path = "../hygrolink-core/src/limits.rs"]
mod limits;

const REQUIRED: [&str; 2] = ["HYGROLINK_WIFI_SSID", "HYGROLINK_WIFI_PASSWORD"];

const DEFAULTS: [(&str, &str); 6] = [
    ("HYGROLINK_BROKER_HOST", "test.mosquitto.org"),
    ("HYGROLINK_BROKER_PORT", "1883"),
    ("HYGROLINK_CLIENT_ID", "hygrolink"),
    ("HYGROLINK_TOPIC_TEMPERATURE", "hygrolink/sensor/temperature"),
    ("HYGROLINK_TOPIC_HUMIDITY", "hygrolink/sensor/humidity"),
    ("HYGROLINK_SAMPLE_PERIOD_SECS", "10"),
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=../hygrolink-core/src/limits.rs");

    // A missing .env is fine; the variables may come from the shell.
    let _ = dotenvy::dotenv();

    let lookup = |key: &str, default: Option<&str>| -> String {
        println!("cargo:rerun-if-env-changed={key}");
        match (env::var(key), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_owned(),
            (Err(_), None) => panic!("{key} must be set in the environment or in .env"),
        }
    };

    let ssid = lookup(REQUIRED[0], None);
    let password = lookup(REQUIRED[1], None);
    let [host, port, client_id, temperature, humidity, period] =
        DEFAULTS.map(|(key, default)| lookup(key, Some(default)));

    let port: u16 = port
        .parse()
        .unwrap_or_else(|_| panic!("HYGROLINK_BROKER_PORT is not a port number: {port}"));
    let period: u64 = period
        .parse()
        .unwrap_or_else(|_| panic!("HYGROLINK_SAMPLE_PERIOD_SECS is not a number: {period}"));

    for (key, value, capacity) in [
        (DEFAULTS[0].0, &host, limits::HOST_CAPACITY),
        (DEFAULTS[2].0, &client_id, limits::CLIENT_ID_CAPACITY),
        (DEFAULTS[3].0, &temperature, limits::TOPIC_CAPACITY),
        (DEFAULTS[4].0, &humidity, limits::TOPIC_CAPACITY),
    ] {
        limits::check_len(key, value, capacity).unwrap_or_else(|e| panic!("{e}"));
    }

    let generated = format!(
        "pub const CONFIG: Config<'static> = Config::new(\n    \
            NetworkConfig {{ ssid: {ssid:?}, password: {password:?} }},\n    \
            BrokerConfig::new({host:?}, {client_id:?}).with_port({port}),\n    \
            TopicConfig {{ temperature: {temperature:?}, humidity: {humidity:?} }},\n\
        )\n\
        .with_sample_period(Duration::from_secs({period}));\n"
    );

    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out.join("config.rs"), generated).expect("failed to write generated config");
}
