fn main() {
    #[cfg(feature = "desktop")]
    tauri_build::try_build(
        tauri_build::Attributes::new().app_manifest(tauri_build::AppManifest::new().commands(&[
            "open_new_window",
            "shell_request",
            "report_page_value",
            "harvest_status",
            "cancel_harvest",
        ])),
    )
    .expect("failed to run tauri-build");
}
