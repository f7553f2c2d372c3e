//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use std::collections::HashMap;

/// Alias for `std::collections::HashMap<K, V, ahash::RandomState>`. This is a
/// hash table that uses a faster hash function, which is significantly faster
/// for the small value/index keys used throughout the lowering engine.
pub type SaHashMap<K, V> = HashMap<K, V, ahash::RandomState>;
