// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::PlatformSegment;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::PlatformSegment;
