fn main() {
    // Only export the ESP-IDF build environment when the espidf feature is
    // enabled; host builds (tests, simulation) need nothing from embuild.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
