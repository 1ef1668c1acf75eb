#![no_main]

use cilimage::ImageInformation;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(image) = ImageInformation::from_mem(data.to_vec()) {
        if let Ok(options) = image.writing_options() {
            let _ = options.apply(data);
        }
    }
});
