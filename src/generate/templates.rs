// SPDX-License-Identifier: GPL-3.0-or-later

//! Static text the generators splice device data into. Placeholders look like `@NAME@` so that
//! they never clash with C or linker-script braces.

pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("@{}@", key), value)
    })
}

pub const GENERATED_BY: &str = concat!("Generated by mcu-device-files ", env!("CARGO_PKG_VERSION"));

pub const APACHE_NOTICE: &[&str] = &[
    "SPDX-License-Identifier: Apache-2.0",
    "",
    "Licensed under the Apache License, Version 2.0 (the \"License\"); you may not use this file",
    "except in compliance with the License. You may obtain a copy of the License at",
    "",
    "http://www.apache.org/licenses/LICENSE-2.0",
    "",
    "Unless required by applicable law or agreed to in writing, software distributed under the",
    "License is distributed on an \"AS IS\" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,",
    "either express or implied. See the License for the specific language governing permissions",
    "and limitations under the License.",
];

pub const LICENSE: &str = "\
The files in this directory were generated from vendor device description documents.

Unless a file states otherwise, it is provided under the Apache License, Version 2.0:

    Licensed under the Apache License, Version 2.0 (the \"License\"); you may not use these
    files except in compliance with the License. You may obtain a copy of the License at

        http://www.apache.org/licenses/LICENSE-2.0

    Unless required by applicable law or agreed to in writing, software distributed under the
    License is distributed on an \"AS IS\" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
    either express or implied. See the License for the specific language governing permissions
    and limitations under the License.

Portions of the startup code and linker scripts are adapted from Arm CMSIS 6
(https://github.com/ARM-software/CMSIS_6), Copyright (c) 2009-2023 Arm Limited.
";

pub const LINKER_SYMBOLS: &str = "
/* Program memory base address and size in bytes. */
__ROM_BASE = @ROM_BASE@;
__ROM_SIZE = @ROM_SIZE@;

/* RAM base address and size in bytes. */
__RAM_BASE = @RAM_BASE@;
__RAM_SIZE = @RAM_SIZE@;

/* Stack, heap and stack guard sizes. Override with the linker's --defsym option. */
PROVIDE(__STACK_SIZE = @STACK_SIZE@);
PROVIDE(__HEAP_SIZE  = @HEAP_SIZE@);
PROVIDE(__STACK_GUARD_SIZE = @GUARD_SIZE@);

/* Armv8-M stack sealing: set to 8 to reserve room for the seal, otherwise keep 0. */
__STACKSEAL_SIZE = 0;
";

pub const LINKER_PROGRAM_SECTIONS: &str = "
    .vectors :
    {
        KEEP(*(.vectors*))
        KEEP(*(.reset*))
    } > @VECTORS@

    .text :
    {
        *(.text*)

        KEEP(*(.init))
        KEEP(*(.fini))

        . = ALIGN(4);
        PROVIDE_HIDDEN (__preinit_array_start = .);
        KEEP(*(.preinit_array))
        PROVIDE_HIDDEN (__preinit_array_end = .);

        . = ALIGN(4);
        PROVIDE_HIDDEN (__init_array_start = .);
        KEEP(*(SORT(.init_array.*)))
        KEEP(*(.init_array))
        PROVIDE_HIDDEN (__init_array_end = .);

        . = ALIGN(4);
        PROVIDE_HIDDEN (__fini_array_start = .);
        KEEP(*(SORT(.fini_array.*)))
        KEEP(*(.fini_array))
        PROVIDE_HIDDEN (__fini_array_end = .);

        *(.rodata*)

        KEEP(*(.eh_frame*))
    } > @FLASH@

    .gnu.sgstubs :
    {
        . = ALIGN(32);
        KEEP(*(.gnu.sgstubs))
    } > @FLASH@

    .ARM.extab :
    {
        *(.ARM.extab* .gnu.linkonce.armextab.*)
    } > @FLASH@

    __exidx_start = .;
    .ARM.exidx :
    {
        *(.ARM.exidx* .gnu.linkonce.armexidx.*)
    } > @FLASH@
    __exidx_end = .;

    PROVIDE(__etext = LOADADDR(.data));
";

pub const LINKER_TCM_SECTION: &str = "
    .@SECTION@ : ALIGN(4)
    {
        *(.@SECTION@)
        *(.@SECTION@.*)
    } > @REGION@

    PROVIDE(__@SECTION@_start = ADDR(.@SECTION@));
    PROVIDE(__@SECTION@_end = ADDR(.@SECTION@) + SIZEOF(.@SECTION@));
";

pub const LINKER_DATA_SECTIONS: &str = "
    .data : ALIGN(4)
    {
        *(vtable)
        *(.data)
        *(.data.*)
        *(.gnu.linkonce.d.*)

        KEEP(*(.jcr*))
        . = ALIGN(4);
    } > @RAM@ AT > @FLASH@

    PROVIDE(__data_start = ADDR(.data));
    PROVIDE(__data_source = LOADADDR(.data));

    .tdata :
    {
        *(.tdata .tdata.* .gnu.linkonce.td.*)
        PROVIDE(__data_end = .);
        PROVIDE(__tdata_end = .);
    } > @RAM@ AT > @FLASH@

    PROVIDE(__tls_base = ADDR(.tdata));
    PROVIDE(__tdata_start = ADDR(.tdata));
    PROVIDE(__tdata_source = LOADADDR(.tdata));
    PROVIDE(__tdata_source_end = LOADADDR(.tdata) + SIZEOF(.tdata));
    PROVIDE(__data_source_end = __tdata_source_end);
    PROVIDE(__tdata_size = SIZEOF(.tdata));
    PROVIDE(__edata = __data_end);
    PROVIDE(__data_size = __data_end - __data_start);

    .tbss (NOLOAD) :
    {
        *(.tbss .tbss.* .gnu.linkonce.tb.*)
        *(.tcommon)
        PROVIDE(__tls_end = .);
        PROVIDE(__tbss_end = .);
    } > @RAM@

    PROVIDE(__bss_start = ADDR(.tbss));
    PROVIDE(__tbss_start = ADDR(.tbss));
    PROVIDE(__tbss_size = SIZEOF(.tbss));
    PROVIDE(__tls_size = __tls_end - __tls_base);
    PROVIDE(__tls_align = MAX(ALIGNOF(.tdata), ALIGNOF(.tbss)));

    .bss :
    {
        . = ALIGN(4);
        *(.bss)
        *(.bss.*)
        *(COMMON)
        . = ALIGN(4);
        __bss_end = .;
    } > @RAM@

    PROVIDE(__end = __bss_end);
    PROVIDE(end = __bss_end);
    PROVIDE(__bss_size = __bss_end - __bss_start);

    .heap (NOLOAD) :
    {
        . = ALIGN(8);
        . = . + __HEAP_SIZE;
        . = ALIGN(8);
        __HeapLimit = .;
        __llvm_libc_heap_limit = .;
    } > @RAM@

    .stack_guard (@STACK_TOP@ - __STACKSEAL_SIZE - __STACK_SIZE - __STACK_GUARD_SIZE) (NOLOAD) :
    {
        __StackGuardStart = .;
        . = . + __STACK_GUARD_SIZE;
        __StackGuardEnd = .;
    } > @RAM@

    .stack (@STACK_TOP@ - __STACKSEAL_SIZE - __STACK_SIZE) (NOLOAD) :
    {
        __StackLimit = .;
        . = . + __STACK_SIZE;
        __StackTop = .;
    } > @RAM@
    PROVIDE(__stack = __StackTop);

    ASSERT(__StackGuardStart >= __HeapLimit, \"RAM region overflowed with stack\")
";

pub const STARTUP_CM_PROLOGUE: &str = r#"
#include <@HEADER@>
#include <stdint.h>

typedef void(*VECTOR_TABLE_Type)(void);

/* Provided by the linker script. */
extern uint32_t __StackTop;
extern uint32_t __StackLimit;
extern uint32_t __data_start;
extern uint32_t __data_source;
extern uint32_t __data_size;
extern uint32_t __bss_start;
extern uint32_t __bss_size;

extern void __libc_init_array(void);
extern int main(void);
extern void exit(int status);

/* Hooks run right after reset and just before main(). */
extern void __attribute__((weak)) _on_reset(void);
extern void __attribute__((weak)) _on_bootstrap(void);

/* ----- Default Handlers: provide your own definitions to override these. ----- */
void __attribute__((noreturn, weak)) HardFault_Handler(void)
{
#ifdef __DEBUG
    __BKPT(0);
#endif
    while(1)
    {}
}

void Default_Handler(void);

/* Aliases cannot be overridden even when weak, so they point here instead. */
void Default_Handler_Jump(void)
{
    Default_Handler();
}

void __attribute__((noreturn, weak)) Default_Handler(void)
{
#ifdef __DEBUG
    __BKPT(0);
#endif
    while(1)
    {}
}

void __attribute__((noreturn, weak)) Reserved_Handler(void)
{
#ifdef __DEBUG
    __BKPT(0);
#endif
    while(1)
    {}
}

void __attribute__((noreturn, section(".reset"))) Reset_Handler(void);
"#;

pub const STARTUP_CM_RESET: &str = r#"
#if (defined(__ARM_FP) && (0 != __ARM_FP)) || (defined(__ARM_FEATURE_MVE) && (__ARM_FEATURE_MVE > 0))
static void __attribute__((section(".reset.startup"))) _EnableFpu(void)
{
    SCB->CPACR |= 0x00F00000;
    __DSB();
    __ISB();
}
#endif

#if (defined(__ICACHE_PRESENT) && __ICACHE_PRESENT == 1) || (defined(__DCACHE_PRESENT) && __DCACHE_PRESENT == 1)
static void __attribute__((section(".reset.startup"))) _EnableCpuCache(void)
{
#  if defined(__ICACHE_PRESENT) && __ICACHE_PRESENT == 1
    SCB_EnableICache();
#  endif
#  if defined(__DCACHE_PRESENT) && __DCACHE_PRESENT == 1
    SCB_EnableDCache();
#  endif
}
#endif

/* Copies .data and .tdata from flash and zeroes .tbss and .bss. */
static void __attribute__((section(".reset.startup"))) _InitData(void)
{
    uint32_t *src = &__data_source;
    uint32_t *dst = &__data_start;
    uint32_t words = (uint32_t)&__data_size / sizeof(uint32_t);

    while(words--)
        *dst++ = *src++;

    dst = &__bss_start;
    words = (uint32_t)&__bss_size / sizeof(uint32_t);

    while(words--)
        *dst++ = 0;
}

void __attribute__((noreturn, section(".reset"))) Reset_Handler(void)
{
    __set_MSP((uint32_t)&__StackTop);
#if defined(__ARM_ARCH_8M_MAIN__) || defined(__ARM_ARCH_8M_BASE__) || defined(__ARM_ARCH_8_1M_MAIN__)
    __set_MSPLIM((uint32_t)&__StackLimit);
#endif

    if(_on_reset)
        _on_reset();

#if (defined(__ARM_FP) && (0 != __ARM_FP)) || (defined(__ARM_FEATURE_MVE) && (__ARM_FEATURE_MVE > 0))
    _EnableFpu();
#endif

    _InitData();

#if (defined(__ICACHE_PRESENT) && __ICACHE_PRESENT == 1) || (defined(__DCACHE_PRESENT) && __DCACHE_PRESENT == 1)
    _EnableCpuCache();
#endif

    __libc_init_array();

    if(_on_bootstrap)
        _on_bootstrap();

    exit(main());

    while(1)
    {}
}
"#;

pub const STARTUP_A_PROLOGUE: &str = r#"
#include <@HEADER@>
#include <stdint.h>

typedef void(*IRQ_HANDLER_Type)(void);

/* Tops of the per-mode stacks, provided by the linker script. */
extern uint32_t __StackTop;
extern uint32_t __data_start;
extern uint32_t __data_source;
extern uint32_t __data_size;
extern uint32_t __bss_start;
extern uint32_t __bss_size;

extern void __libc_init_array(void);
extern int main(void);
extern void exit(int status);

extern void __attribute__((weak)) _on_reset(void);
extern void __attribute__((weak)) _on_bootstrap(void);

/* Peripheral ID of the interrupt being serviced, from the interrupt controller driver. */
extern uint32_t __attribute__((weak)) _irq_active_id(void);

/* ----- Default Handlers: provide your own definitions to override these. ----- */
void __attribute__((noreturn, weak)) Undef_Handler(void)     { while(1) {} }
void __attribute__((noreturn, weak)) SVC_Handler(void)       { while(1) {} }
void __attribute__((noreturn, weak)) PAbt_Handler(void)      { while(1) {} }
void __attribute__((noreturn, weak)) DAbt_Handler(void)      { while(1) {} }
void __attribute__((noreturn, weak)) FIQ_Handler(void)       { while(1) {} }
void __attribute__((noreturn, weak)) Default_Handler(void)   { while(1) {} }
void __attribute__((noreturn, weak)) Reserved_Handler(void)  { while(1) {} }

void Default_Handler_Jump(void)
{
    Default_Handler();
}

void __attribute__((noreturn, section(".reset"))) Reset_Handler(void);

/* Exception vectors, one branch per architectural exception. */
void __attribute__((naked, used, retain, section(".vectors"))) __vectors(void)
{
    __asm volatile(
        "ldr pc, =Reset_Handler \n"
        "ldr pc, =Undef_Handler \n"
        "ldr pc, =SVC_Handler   \n"
        "ldr pc, =PAbt_Handler  \n"
        "ldr pc, =DAbt_Handler  \n"
        "nop                    \n"
        "ldr pc, =IRQ_Handler   \n"
        "ldr pc, =FIQ_Handler   \n"
    );
}
"#;

pub const STARTUP_A_IRQ_DISPATCH: &str = r#"
void __attribute__((weak, interrupt("IRQ"))) IRQ_Handler(void)
{
    uint32_t id = _irq_active_id ? _irq_active_id() : @COUNT@;

    if(id < @COUNT@)
        __IRQ_TABLE[id]();
    else
        Default_Handler();
}
"#;

pub const STARTUP_A_IRQ_DEFAULT: &str = r#"
void __attribute__((weak, interrupt("IRQ"))) IRQ_Handler(void)
{
    Default_Handler();
}
"#;

pub const STARTUP_A_RESET: &str = r#"
static void __attribute__((section(".reset.startup"))) _InitData(void)
{
    uint32_t *src = &__data_source;
    uint32_t *dst = &__data_start;
    uint32_t words = (uint32_t)&__data_size / sizeof(uint32_t);

    while(words--)
        *dst++ = *src++;

    dst = &__bss_start;
    words = (uint32_t)&__bss_size / sizeof(uint32_t);

    while(words--)
        *dst++ = 0;
}

void __attribute__((naked, noreturn, section(".reset"))) Reset_Handler(void)
{
    /* Enter System mode with IRQ and FIQ masked, then load the stack. */
    __asm volatile(
        "msr cpsr_c, #0xDF  \n"
        "ldr sp, =__StackTop \n"
    );

    if(_on_reset)
        _on_reset();

    _InitData();
    __libc_init_array();

    if(_on_bootstrap)
        _on_bootstrap();

    exit(main());

    while(1)
    {}
}
"#;

pub const CONFIG_COMMON: &str = "
# The options below are matched against the sysroot's multilib.yaml to pick libraries.
--sysroot=<CFGDIR>/../@SYSROOT@

-isystem <CFGDIR>/../@SYSROOT@/CMSIS/Core/Include
-isystem <CFGDIR>/../@SYSROOT@/include
-isystem <CFGDIR>/../include

# Use the runtime and linker bundled with the toolchain.
-rtlib=compiler-rt
-fuse-ld=lld
";
