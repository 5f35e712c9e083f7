// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use naiad::server;

fn main() {
    if let Err(err) = server::run_server() {
        eprintln!("naiad: {err}");
        std::process::exit(err.exit_code());
    }
}
