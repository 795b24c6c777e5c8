fn main() {
    // Link args only exist when esp-idf-sys is in the graph.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
