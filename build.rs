//! Build script for small_alloc.
//!
//! Provides build-time diagnostics and feature reminders for users
//! integrating small_alloc into their projects.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    if debug_enabled {
        emit_info("Debug features enabled");
        emit_note("Debug mode provides:");
        emit_note("  • Memory poisoning (freed memory filled with 0xCD)");
        emit_note("  • Extended validation checks");

        if is_release {
            emit_warning("Debug features enabled in release build!");
            emit_note("This may impact performance. Consider disabling for production.");
        }
    } else if !is_release {
        emit_note("Tip: Enable 'debug' feature for memory poisoning of freed objects:");
        emit_note("  small_alloc = { version = \"0.1\", features = [\"debug\"] }");
    }

    if log_enabled {
        emit_info("log crate integration enabled (activation/GC transitions traced)");
    }

    emit_separator();
    emit_info("small_alloc Quick Reference");
    emit_separator();
    emit_note("let mut alloc = SmallAllocator::create(SmallAllocConfig::default());");
    emit_note("let ptr = alloc.smalloc(64).expect(\"out of memory\");");
    emit_note("alloc.smfree(ptr, 64);");
    emit_note("");
    emit_note("Delayed free (e.g. while iterating a snapshot):");
    emit_note("  alloc.set_delayed_free_mode(true);");
    emit_note("  alloc.smfree_delayed(ptr, size);");
    emit_note("  alloc.set_delayed_free_mode(false); // drains in GC_BATCH-sized steps");
    emit_separator();

    check_target_features();
}

fn emit_info(msg: &str) {
    println!("cargo:warning=[small_alloc] info: {}", msg);
}

fn emit_note(msg: &str) {
    if msg.is_empty() {
        println!("cargo:warning=[small_alloc]");
    } else {
        println!("cargo:warning=[small_alloc]    {}", msg);
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[small_alloc] warning: {}", msg);
}

fn emit_separator() {
    println!("cargo:warning=[small_alloc] ----------------------------------------");
}

fn check_target_features() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("small_alloc has no threading assumptions, so WASM works out of the box,");
        emit_note("but the arena's quota should be set explicitly given constrained memory.");
    }
}
