/// Turns a folder-qualified job name into its URL form, `a/b/c` -> `a/job/b/job/c`.
pub fn translate_folder_job_name(full_name: &str) -> String {
    full_name.replace('/', "/job/")
}

/// Job path usable after `{jenkins}/job/`, with every segment percent-encoded.
pub(crate) fn job_url_path(full_name: &str) -> String {
    full_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/job/")
}
