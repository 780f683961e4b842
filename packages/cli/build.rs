// ABOUTME: Build script embedding analytics configuration at compile time
// ABOUTME: Captures POSTHOG_API_KEY so release builds ship with a project key

fn main() {
    // Runtime env still overrides the embedded key
    if let Ok(key) = std::env::var("POSTHOG_API_KEY") {
        println!("cargo:rustc-env=POSTHOG_API_KEY={}", key);
    }

    println!("cargo:rerun-if-env-changed=POSTHOG_API_KEY");
}
