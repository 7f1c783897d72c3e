fn main() -> std::process::ExitCode {
    mindrover::run()
}
