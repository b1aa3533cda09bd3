use npq_core::version::version_string;

pub fn run() {
    println!("{}", version_string());
}
